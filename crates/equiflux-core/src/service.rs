// crates/equiflux-core/src/service.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use equiflux_parser::{parse_bulk_payload, parse_payload, BulkChannelPayload, ChannelPayload};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::catalog::ChannelDefinitionCatalog;
use crate::equipment::{validate_wkeid, Equipment};
use crate::error::{Result, ServiceError};
use crate::interfaces::{
    EquipmentDirectory, HistorianClient, HistorianError, HistorianWriter, Series,
};
use crate::mapping::{map_rows, ChannelMapper};
use crate::query::{Aggregation, EpisodeFilter, GroupBy, MathFunction, Query, QueryBuilder};
use crate::resolver::StoragePathResolver;
use crate::timestamp::TimePeriod;
use crate::types::{ChannelDescription, InfluxPath, WriteRow};

const TIME_COLUMN: &str = "time";
const EPISODE_COLUMN: &str = "Episode";
const FIELD_KEY_COLUMN: &str = "fieldKey";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    pub wkeid: String,
    /// Channel codes. Empty selects every field.
    pub channels: Vec<String>,
    pub aggregation: Option<Aggregation>,
    pub period: Option<TimePeriod>,
    pub group_by: Option<GroupBy>,
    pub episode: Option<EpisodeFilter>,
}

impl ReadRequest {
    pub fn new<I, S>(wkeid: impl Into<String>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            wkeid: wkeid.into(),
            channels: channels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MathRequest {
    pub wkeid: String,
    pub left: String,
    pub function: MathFunction,
    pub right: String,
    pub period: Option<TimePeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseColumn {
    pub name: String,
    /// `None` for the time column and tags.
    pub channel: Option<ChannelDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSeries {
    pub name: String,
    pub columns: Vec<ResponseColumn>,
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDataResponse {
    pub wkeid: String,
    pub path: Option<InfluxPath>,
    pub period: Option<TimePeriod>,
    pub series: Vec<ChannelSeries>,
}

impl ChannelDataResponse {
    fn empty(wkeid: &str, path: Option<InfluxPath>, period: Option<TimePeriod>) -> Self {
        Self {
            wkeid: wkeid.to_string(),
            path,
            period,
            series: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|series| series.values.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub wkeid: String,
    /// `None` when there was nothing to write and no path was resolved.
    pub path: Option<InfluxPath>,
    pub rows_written: usize,
}

impl WriteSummary {
    fn nothing_written(wkeid: &str) -> Self {
        Self {
            wkeid: wkeid.to_string(),
            path: None,
            rows_written: 0,
        }
    }
}

/// Composes the catalog, mapper, resolver and historian into the read and
/// write operations exposed at the boundary.
#[derive(Clone)]
pub struct ChannelDataService {
    catalog: ChannelDefinitionCatalog,
    mapper: ChannelMapper,
    resolver: StoragePathResolver,
    equipment: Arc<dyn EquipmentDirectory>,
    historian: Arc<dyn HistorianClient>,
    writer: Arc<dyn HistorianWriter>,
    default_window_hours: i64,
}

impl ChannelDataService {
    pub fn new(
        catalog: ChannelDefinitionCatalog,
        resolver: StoragePathResolver,
        equipment: Arc<dyn EquipmentDirectory>,
        historian: Arc<dyn HistorianClient>,
        writer: Arc<dyn HistorianWriter>,
        default_window_hours: i64,
    ) -> Self {
        Self {
            mapper: ChannelMapper::new(catalog.clone()),
            catalog,
            resolver,
            equipment,
            historian,
            writer,
            default_window_hours,
        }
    }

    pub fn catalog(&self) -> &ChannelDefinitionCatalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &StoragePathResolver {
        &self.resolver
    }

    pub async fn read_channels(&self, request: &ReadRequest) -> Result<ChannelDataResponse> {
        let wkeid = request.wkeid.as_str();
        let equipment = self.equipment_for(wkeid).await?;
        let Some(path) = self.resolver.resolve_read(&equipment).await? else {
            return Ok(ChannelDataResponse::empty(wkeid, None, None));
        };

        let definitions = self.catalog.validate_channel_codes(&request.channels).await?;
        let fields = definitions
            .iter()
            .map(|definition| definition.field_name())
            .collect::<Result<Vec<_>>>()?;

        let base = QueryBuilder::for_path(&path).equipment_instance(wkeid);
        let Some(period) = self.period_for(&base, request.period).await? else {
            return Ok(ChannelDataResponse::empty(wkeid, Some(path), None));
        };

        let mut builder = base.clone().period(period);
        if fields.is_empty() {
            builder = builder.select_all_fields();
        } else {
            let available = self.available_fields(&base).await?;
            let mut present: Vec<String> = fields
                .into_iter()
                .filter(|field| available.contains(field))
                .collect();
            builder = match present.len() {
                0 => return Ok(ChannelDataResponse::empty(wkeid, Some(path), Some(period))),
                1 => builder.select_field(present.remove(0)),
                _ => builder.select_fields(present),
            };
        }

        if let Some(aggregation) = request.aggregation {
            builder = builder.aggregate(aggregation);
        }
        if let Some(group_by) = &request.group_by {
            builder = builder.group_by(group_by.clone());
        }
        if let Some(episode) = &request.episode {
            builder = builder.episode(episode.clone());
        }

        let query = builder.build()?;
        let series = self.run_multi_series(&query).await?;
        self.shape_response(wkeid, path, period, series).await
    }

    pub async fn read_math(&self, request: &MathRequest) -> Result<ChannelDataResponse> {
        let wkeid = request.wkeid.as_str();
        let equipment = self.equipment_for(wkeid).await?;
        let Some(path) = self.resolver.resolve_read(&equipment).await? else {
            return Ok(ChannelDataResponse::empty(wkeid, None, None));
        };

        let codes = [request.left.clone(), request.right.clone()];
        let definitions = self.catalog.validate_channel_codes(&codes).await?;
        let left = definitions[0].field_name()?;
        let right = definitions[1].field_name()?;

        let base = QueryBuilder::for_path(&path).equipment_instance(wkeid);
        let Some(period) = self.period_for(&base, request.period).await? else {
            return Ok(ChannelDataResponse::empty(wkeid, Some(path), None));
        };

        let available = self.available_fields(&base).await?;
        if !available.contains(&left) || !available.contains(&right) {
            return Ok(ChannelDataResponse::empty(wkeid, Some(path), Some(period)));
        }

        let query = base
            .period(period)
            .select_math(left, request.function, right)
            .build()?;
        let series = self.run_multi_series(&query).await?;
        self.shape_response(wkeid, path, period, series).await
    }

    pub async fn latest_timestamp(&self, wkeid: &str) -> Result<Option<DateTime<Utc>>> {
        let equipment = self.equipment_for(wkeid).await?;
        let Some(path) = self.resolver.resolve_read(&equipment).await? else {
            return Ok(None);
        };
        let query = QueryBuilder::for_path(&path)
            .equipment_instance(wkeid)
            .latest_timestamp()?;
        self.historian
            .latest_timestamp(&query)
            .await
            .map_err(|err| historian_failure(&query, err))
    }

    /// Field keys stored for the equipment's measurement, decoded to channels.
    pub async fn list_fields(&self, wkeid: &str) -> Result<Vec<ChannelDescription>> {
        let equipment = self.equipment_for(wkeid).await?;
        let Some(path) = self.resolver.resolve_read(&equipment).await? else {
            return Ok(Vec::new());
        };

        let base = QueryBuilder::for_path(&path).equipment_instance(wkeid);
        let mut keys: Vec<String> = self.available_fields(&base).await?.into_iter().collect();
        keys.sort();

        let mut descriptions = Vec::with_capacity(keys.len());
        for key in keys {
            descriptions.push(self.catalog.channel_description(&key).await?);
        }
        Ok(descriptions)
    }

    /// The payload is mapped in full before the write path is resolved; a
    /// rejected or empty payload never provisions a mapping.
    pub async fn write_channels(
        &self,
        wkeid: &str,
        payload: &ChannelPayload,
    ) -> Result<WriteSummary> {
        let equipment = self.equipment_for(wkeid).await?;
        let parsed = parse_payload(payload)?;
        let rows = self.mapper.map_payload(&parsed).await?;
        if rows.is_empty() {
            debug!(wkeid = %wkeid, "payload has no rows");
            return Ok(WriteSummary::nothing_written(wkeid));
        }
        let path = self.resolver.resolve_write(&equipment).await?;

        self.write(wkeid, path, rows).await
    }

    /// All-or-nothing across equipments: every id, equipment, row group and
    /// write path is settled before the first row is written.
    pub async fn bulk_write(&self, payload: &BulkChannelPayload) -> Result<Vec<WriteSummary>> {
        let parsed = parse_bulk_payload(payload)?;
        let channels = self.mapper.resolve_channels(&parsed.channels).await?;

        let mut mapped: Vec<(Equipment, Vec<WriteRow>)> =
            Vec::with_capacity(parsed.equipments.len());
        for group in &parsed.equipments {
            let wkeid = group.equipment_id.as_deref().unwrap_or_default();
            let equipment = self.equipment_for(wkeid).await?;
            let rows = map_rows(&channels, group)?;
            mapped.push((equipment, rows));
        }

        let mut planned = Vec::with_capacity(mapped.len());
        for (equipment, rows) in mapped {
            // Groups without rows are not routed.
            let path = if rows.is_empty() {
                None
            } else {
                Some(self.resolver.resolve_write(&equipment).await?)
            };
            planned.push((equipment.wkeid, path, rows));
        }

        info!(
            equipments = planned.len(),
            rows = planned.iter().map(|(_, _, rows)| rows.len()).sum::<usize>(),
            "bulk write validated"
        );

        let mut summaries = Vec::with_capacity(planned.len());
        for (wkeid, path, rows) in planned {
            let summary = match path {
                Some(path) => self.write(&wkeid, path, rows).await?,
                None => WriteSummary::nothing_written(&wkeid),
            };
            summaries.push(summary);
        }
        Ok(summaries)
    }

    async fn write(&self, wkeid: &str, path: InfluxPath, rows: Vec<WriteRow>) -> Result<WriteSummary> {
        self.writer
            .write_rows(&path, wkeid, &rows)
            .await
            .map_err(|err| {
                error!(wkeid = %wkeid, path = %path, error = %err, "historian write failed");
                ServiceError::Historian(err)
            })?;

        info!(wkeid = %wkeid, path = %path, rows = rows.len(), "channel rows written");
        Ok(WriteSummary {
            wkeid: wkeid.to_string(),
            path: Some(path),
            rows_written: rows.len(),
        })
    }

    async fn equipment_for(&self, wkeid: &str) -> Result<Equipment> {
        validate_wkeid(wkeid)?;
        self.equipment
            .equipment(wkeid)
            .await?
            .ok_or_else(|| ServiceError::EquipmentNotFound {
                wkeid: wkeid.to_string(),
            })
    }

    /// Explicit period, or the default trailing window ending at the latest
    /// stored point. `None` when the equipment has no data at all.
    async fn period_for(
        &self,
        base: &QueryBuilder,
        requested: Option<TimePeriod>,
    ) -> Result<Option<TimePeriod>> {
        if let Some(period) = requested {
            return Ok(Some(period));
        }

        let query = base.latest_timestamp()?;
        let latest = self
            .historian
            .latest_timestamp(&query)
            .await
            .map_err(|err| historian_failure(&query, err))?;

        latest
            .map(|end| TimePeriod::trailing(end, self.default_window_hours))
            .transpose()
    }

    async fn available_fields(&self, base: &QueryBuilder) -> Result<HashSet<String>> {
        let query = base.show_field_keys();
        let rows = self
            .historian
            .execute_query(&query)
            .await
            .map_err(|err| historian_failure(&query, err))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get(FIELD_KEY_COLUMN).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn run_multi_series(&self, query: &Query) -> Result<Vec<Series>> {
        self.historian
            .execute_multi_series(query)
            .await
            .map_err(|err| historian_failure(query, err))
    }

    async fn shape_response(
        &self,
        wkeid: &str,
        path: InfluxPath,
        period: TimePeriod,
        series: Vec<Series>,
    ) -> Result<ChannelDataResponse> {
        let mut shaped = Vec::with_capacity(series.len());
        for entry in series {
            let mut columns = Vec::with_capacity(entry.columns.len());
            for name in entry.columns {
                let channel = if name == TIME_COLUMN || name == EPISODE_COLUMN {
                    None
                } else {
                    Some(self.catalog.channel_description(&name).await?)
                };
                columns.push(ResponseColumn { name, channel });
            }
            shaped.push(ChannelSeries {
                name: entry.name,
                columns,
                values: entry.values,
            });
        }

        Ok(ChannelDataResponse {
            wkeid: wkeid.to_string(),
            path: Some(path),
            period: Some(period),
            series: shaped,
        })
    }
}

fn historian_failure(query: &Query, err: HistorianError) -> ServiceError {
    error!(
        database = %query.database(),
        query = %query,
        error = %err,
        "historian query failed"
    );
    ServiceError::Historian(err)
}
