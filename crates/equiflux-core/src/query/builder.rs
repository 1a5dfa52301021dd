use crate::error::{Result, ServiceError};
use crate::fields::decode_field_name;
use crate::timestamp::TimePeriod;
use crate::types::InfluxPath;

use super::model::{Aggregation, EpisodeFilter, GroupBy, MathFunction, Selection};
use super::Query;

const EPISODE_TAG: &str = "Episode";

/// Immutable query description. Every setter consumes the builder and returns
/// the updated value, so a shared prefix can be cloned and finished two ways.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    database: String,
    measurement: String,
    equipment_instance: Option<String>,
    selection: Option<Selection>,
    aggregation: Option<Aggregation>,
    period: Option<TimePeriod>,
    episode: Option<EpisodeFilter>,
    group_by: Option<GroupBy>,
}

impl QueryBuilder {
    pub fn new(database: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            measurement: measurement.into(),
            ..Self::default()
        }
    }

    pub fn for_path(path: &InfluxPath) -> Self {
        Self::new(path.technology.clone(), path.brand.clone())
    }

    pub fn equipment_instance(mut self, wkeid: impl Into<String>) -> Self {
        self.equipment_instance = Some(wkeid.into());
        self
    }

    pub fn select_field(mut self, field: impl Into<String>) -> Self {
        self.selection = Some(Selection::Field(field.into()));
        self
    }

    pub fn select_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(Selection::Fields(fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn select_all_fields(mut self) -> Self {
        self.selection = Some(Selection::AllFields);
        self
    }

    /// Two encoded field names combined with an arithmetic operator.
    pub fn select_math(
        mut self,
        left: impl Into<String>,
        function: MathFunction,
        right: impl Into<String>,
    ) -> Self {
        self.selection = Some(Selection::Math {
            left: left.into(),
            function,
            right: right.into(),
        });
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn period(mut self, period: TimePeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn episode(mut self, episode: EpisodeFilter) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn build(&self) -> Result<Query> {
        let selection = self.render_selection()?;
        let mut text = format!(
            "SELECT {selection} FROM {} WHERE {}",
            quote_identifier(&self.measurement),
            self.render_instance_filter()?,
        );

        if let Some(EpisodeFilter::Id(episode_id)) = &self.episode {
            text.push_str(&format!(" AND {EPISODE_TAG}={}", quote_value(episode_id)));
        }

        if let Some(period) = &self.period {
            text.push_str(&format!(
                " AND time >= {} AND time <= {}",
                period.start_nanos(),
                period.end_nanos()
            ));
        }

        if let Some(group_by) = &self.group_by {
            text.push_str(&format!(
                " GROUP BY time({}) FILL({})",
                group_by.interval(),
                group_by.fill().token()
            ));
        }

        Ok(Query::new(self.database.clone(), text))
    }

    /// Schema discovery for the measurement.
    pub fn show_field_keys(&self) -> Query {
        Query::new(
            self.database.clone(),
            format!("SHOW FIELD KEYS FROM {}", quote_identifier(&self.measurement)),
        )
    }

    /// Most recent point for the equipment instance.
    pub fn latest_timestamp(&self) -> Result<Query> {
        Ok(Query::new(
            self.database.clone(),
            format!(
                "SELECT * FROM {} WHERE {} ORDER BY time DESC LIMIT 1",
                quote_identifier(&self.measurement),
                self.render_instance_filter()?,
            ),
        ))
    }

    fn render_instance_filter(&self) -> Result<String> {
        let wkeid = self
            .equipment_instance
            .as_deref()
            .ok_or_else(|| ServiceError::UnsupportedQuery("no equipment instance filter".into()))?;
        Ok(format!("EquipmentInstance={}", quote_value(wkeid)))
    }

    fn render_selection(&self) -> Result<String> {
        let selection = self
            .selection
            .as_ref()
            .ok_or_else(|| ServiceError::UnsupportedQuery("no field selection".into()))?;

        match (selection, self.aggregation) {
            (Selection::AllFields, None) => Ok("*".to_string()),
            (Selection::AllFields, Some(aggregation)) => Ok(format!("{aggregation}(*)")),
            (Selection::Field(field), aggregation) => {
                self.render_fields(std::slice::from_ref(field), aggregation)
            }
            (Selection::Fields(fields), aggregation) => self.render_fields(fields, aggregation),
            (Selection::Math { .. }, Some(aggregation)) => Err(ServiceError::UnsupportedQuery(
                format!("aggregation '{aggregation}' cannot wrap a math selection"),
            )),
            (
                Selection::Math {
                    left,
                    function,
                    right,
                },
                None,
            ) => {
                let alias = format!(
                    "{}_{}_{}",
                    decode_field_name(left).code,
                    function.name(),
                    decode_field_name(right).code
                );
                Ok(format!(
                    "{} {} {} AS {}",
                    quote_identifier(left),
                    function.operator(),
                    quote_identifier(right),
                    quote_identifier(&alias)
                ))
            }
        }
    }

    fn render_fields(&self, fields: &[String], aggregation: Option<Aggregation>) -> Result<String> {
        if fields.is_empty() {
            return Err(ServiceError::UnsupportedQuery("empty field list".into()));
        }

        let mut rendered: Vec<String> = match aggregation {
            None => fields.iter().map(|field| quote_identifier(field)).collect(),
            Some(aggregation) => fields
                .iter()
                .map(|field| {
                    format!(
                        "{aggregation}({}) AS {}",
                        quote_identifier(field),
                        quote_identifier(&format!("{aggregation}_{field}"))
                    )
                })
                .collect(),
        };

        if aggregation.is_none()
            && self.episode.is_some()
            && !fields.iter().any(|field| field == EPISODE_TAG)
        {
            rendered.push(quote_identifier(EPISODE_TAG));
        }

        Ok(rendered.join(","))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\\\""))
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
