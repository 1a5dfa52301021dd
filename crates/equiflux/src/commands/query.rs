use anyhow::{bail, Context, Result};
use clap::Args;
use equiflux_core::{
    Aggregation, EpisodeFilter, GroupBy, MathFunction, Query, QueryBuilder, TimePeriod,
};

#[derive(Args, Debug, Default)]
pub struct RenderQueryArgs {
    /// Historian database (technology)
    #[arg(long)]
    pub database: String,
    /// Measurement (brand)
    #[arg(long)]
    pub measurement: String,
    /// Equipment instance id, `<material>:<serial>`
    #[arg(long)]
    pub wkeid: Option<String>,
    /// Stored field name; repeat for several fields
    #[arg(long = "field")]
    pub fields: Vec<String>,
    /// Select every field of the measurement
    #[arg(long, conflicts_with_all = ["fields", "math"])]
    pub all_fields: bool,
    /// Two-field arithmetic, e.g. `--math AirPressure.kPa / DischargeRate.m3/sec`
    #[arg(long, num_args = 3, value_names = ["LEFT", "FUNCTION", "RIGHT"], conflicts_with = "fields")]
    pub math: Option<Vec<String>>,
    /// mean, max, min, sum, count, ...
    #[arg(long)]
    pub aggregation: Option<String>,
    #[arg(long, requires = "end")]
    pub start: Option<String>,
    #[arg(long, requires = "start")]
    pub end: Option<String>,
    /// InfluxQL duration literal such as `1h` or `30s`
    #[arg(long)]
    pub group_by: Option<String>,
    /// Fill policy for grouped queries (null, none, previous, linear or a number)
    #[arg(long, requires = "group_by")]
    pub fill: Option<String>,
    /// Include the Episode tag in raw field selections
    #[arg(long)]
    pub episode: bool,
    /// Restrict to one episode (implies --episode)
    #[arg(long)]
    pub episode_id: Option<String>,
    /// Print the field discovery query instead
    #[arg(long, conflicts_with = "latest")]
    pub show_field_keys: bool,
    /// Print the latest-timestamp query instead
    #[arg(long)]
    pub latest: bool,
}

pub fn build_query(args: &RenderQueryArgs) -> Result<Query> {
    let mut builder = QueryBuilder::new(&args.database, &args.measurement);
    if let Some(wkeid) = &args.wkeid {
        builder = builder.equipment_instance(wkeid);
    }

    if args.show_field_keys {
        return Ok(builder.show_field_keys());
    }
    if args.latest {
        return Ok(builder.latest_timestamp()?);
    }

    builder = match (&args.math, args.fields.as_slice()) {
        (Some(math), _) => {
            let [left, function, right] = math.as_slice() else {
                bail!("--math takes exactly three values");
            };
            let function: MathFunction = function.parse()?;
            builder.select_math(left, function, right)
        }
        _ if args.all_fields => builder.select_all_fields(),
        (None, [field]) => builder.select_field(field),
        (None, fields) => builder.select_fields(fields.iter().cloned()),
    };

    if let Some(aggregation) = &args.aggregation {
        builder = builder.aggregate(aggregation.parse::<Aggregation>()?);
    }
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        builder = builder.period(TimePeriod::parse(start, end).context("invalid time period")?);
    }
    if let Some(interval) = &args.group_by {
        builder = builder.group_by(GroupBy::parse(interval, args.fill.as_deref())?);
    }
    if let Some(id) = &args.episode_id {
        builder = builder.episode(EpisodeFilter::Id(id.clone()));
    } else if args.episode {
        builder = builder.episode(EpisodeFilter::Any);
    }

    Ok(builder.build()?)
}

pub fn handle_render_query(args: RenderQueryArgs) -> Result<()> {
    let query = build_query(&args)?;
    println!("-- database: {}", query.database());
    println!("{}", query.text());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RenderQueryArgs {
        RenderQueryArgs {
            database: "DXJ_WPS_BLENDING_EQUIPMENT".into(),
            measurement: "WS-63_STIMULATION_BLENDER_PROP".into(),
            wkeid: Some("100196736:SBF62412A0281".into()),
            ..Default::default()
        }
    }

    #[test]
    fn renders_single_field_read() {
        let args = RenderQueryArgs {
            fields: vec!["AirPressure.kPa".into()],
            start: Some("2019-08-12".into()),
            end: Some("2019-08-14".into()),
            ..base()
        };

        let query = build_query(&args).unwrap();
        assert_eq!(query.database(), "DXJ_WPS_BLENDING_EQUIPMENT");
        assert_eq!(
            query.text(),
            "SELECT \"AirPressure.kPa\" FROM \"WS-63_STIMULATION_BLENDER_PROP\" \
             WHERE EquipmentInstance='100196736:SBF62412A0281' \
             AND time >= 1565568000000000000 AND time <= 1565740800000000000"
        );
    }

    #[test]
    fn math_accepts_operator_or_name() {
        let by_name = RenderQueryArgs {
            math: Some(vec!["A.kPa".into(), "Divide".into(), "B.kPa".into()]),
            ..base()
        };
        let by_operator = RenderQueryArgs {
            math: Some(vec!["A.kPa".into(), "/".into(), "B.kPa".into()]),
            ..base()
        };
        assert_eq!(
            build_query(&by_name).unwrap().text(),
            build_query(&by_operator).unwrap().text()
        );
    }

    #[test]
    fn unknown_aggregation_is_rejected() {
        let args = RenderQueryArgs {
            fields: vec!["AirPressure.kPa".into()],
            aggregation: Some("median-ish".into()),
            ..base()
        };
        assert!(build_query(&args).is_err());
    }

    #[test]
    fn missing_instance_is_rejected() {
        let args = RenderQueryArgs {
            wkeid: None,
            fields: vec!["AirPressure.kPa".into()],
            ..base()
        };
        assert!(build_query(&args).is_err());
    }

    #[test]
    fn field_keys_ignore_the_selection() {
        let args = RenderQueryArgs {
            show_field_keys: true,
            ..base()
        };
        assert_eq!(
            build_query(&args).unwrap().text(),
            "SHOW FIELD KEYS FROM \"WS-63_STIMULATION_BLENDER_PROP\""
        );
    }
}
