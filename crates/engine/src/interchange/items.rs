use std::io::{Read, Write};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stowage_cargo::{Dimensions, Item, ItemSpec, ItemStatus, WasteReason};
use stowage_core::ItemId;

use super::{optional, parse_rows, reader, require_columns, InterchangeError, Parsed};

const REQUIRED: [&str; 10] = [
    "Item ID",
    "Name",
    "Width (cm)",
    "Depth (cm)",
    "Height (cm)",
    "Mass (kg)",
    "Priority (1-100)",
    "Expiry Date (ISO Format)",
    "Usage Limit",
    "Preferred Zone",
];

const EXTRA: [&str; 4] = ["Remaining Uses", "Status", "Waste Reason", "Waste Recorded At"];

#[derive(Debug, Serialize, Deserialize)]
struct ItemRecord {
    #[serde(rename = "Item ID")]
    item_id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Width (cm)")]
    width: f64,
    #[serde(rename = "Depth (cm)")]
    depth: f64,
    #[serde(rename = "Height (cm)")]
    height: f64,
    #[serde(rename = "Mass (kg)")]
    mass: f64,
    #[serde(rename = "Priority (1-100)")]
    priority: u8,
    #[serde(rename = "Expiry Date (ISO Format)")]
    expiry_date: Option<String>,
    #[serde(rename = "Usage Limit")]
    usage_limit: Option<String>,
    #[serde(rename = "Preferred Zone")]
    preferred_zone: String,
    #[serde(rename = "Remaining Uses", default)]
    remaining_uses: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Waste Reason", default)]
    waste_reason: Option<String>,
    #[serde(rename = "Waste Recorded At", default)]
    waste_recorded_at: Option<String>,
}

/// An imported item and, for waste, when it was declared waste.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub item: Item,
    pub waste_recorded_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    fn into_row(self) -> Result<ItemRow, String> {
        let item_id = ItemId::parse(self.item_id).map_err(|e| e.to_string())?;
        let expiry_date = optional(self.expiry_date)
            .map(|d| {
                // Timestamps are accepted; only the date part matters.
                let day = d.get(..10).unwrap_or(&d);
                day.parse::<NaiveDate>()
                    .map_err(|e| format!("bad expiry date '{d}': {e}"))
            })
            .transpose()?;
        let usage_limit = parse_count(self.usage_limit, "usage limit")?;
        let remaining_uses = parse_count(self.remaining_uses, "remaining uses")?;
        let status = optional(self.status)
            .map(|s| ItemStatus::parse(&s).map_err(|e| e.to_string()))
            .transpose()?;
        let waste_reason = optional(self.waste_reason)
            .map(|s| WasteReason::parse(&s).map_err(|e| e.to_string()))
            .transpose()?;
        let waste_recorded_at = optional(self.waste_recorded_at)
            .map(|t| {
                DateTime::parse_from_rfc3339(&t)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|e| format!("bad waste timestamp '{t}': {e}"))
            })
            .transpose()?;

        let spec = ItemSpec {
            item_id,
            name: self.name,
            dimensions: Dimensions {
                width: self.width,
                depth: self.depth,
                height: self.height,
            },
            mass: self.mass,
            priority: self.priority,
            expiry_date,
            usage_limit,
            preferred_zone: self.preferred_zone,
        };
        let item = match status {
            None => Item::new(spec),
            Some(status) => {
                let remaining = remaining_uses.or(spec.usage_limit);
                Item::restore(spec, remaining, status, waste_reason)
            }
        };
        Ok(ItemRow {
            item: item.map_err(|e| e.to_string())?,
            waste_recorded_at,
        })
    }

    fn from_item(item: &Item, waste_recorded_at: Option<DateTime<Utc>>) -> Self {
        let dims = item.dimensions();
        Self {
            item_id: item.spec().item_id.to_string(),
            name: item.name().to_string(),
            width: dims.width,
            depth: dims.depth,
            height: dims.height,
            mass: item.mass(),
            priority: item.priority(),
            expiry_date: item.expiry_date().map(|d| d.to_string()),
            usage_limit: item.usage_limit().map(|n| n.to_string()),
            preferred_zone: item.preferred_zone().to_string(),
            remaining_uses: item.remaining_uses().map(|n| n.to_string()),
            status: Some(item.status().to_string()),
            waste_reason: item.waste_reason().map(|r| r.to_string()),
            waste_recorded_at: waste_recorded_at.map(|at| at.to_rfc3339()),
        }
    }
}

fn parse_count(cell: Option<String>, what: &str) -> Result<Option<u32>, String> {
    optional(cell)
        .map(|c| c.parse::<u32>().map_err(|e| format!("bad {what} '{c}': {e}")))
        .transpose()
}

/// Read an items file. Rows without a `Status` column come back staged;
/// exported rows keep their counters and lifecycle state.
pub fn read_items<R: Read>(input: R) -> Result<Parsed<ItemRow>, InterchangeError> {
    let mut reader = reader(input);
    require_columns(&mut reader, &REQUIRED)?;
    Ok(parse_rows(reader, ItemRecord::into_row))
}

/// Write items, each with the time its waste record was made, if any.
pub fn write_items<'a, W, I>(output: W, items: I) -> Result<(), InterchangeError>
where
    W: Write,
    I: IntoIterator<Item = (&'a Item, Option<DateTime<Utc>>)>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    writer.write_record(REQUIRED.iter().chain(EXTRA.iter()))?;
    for (item, waste_recorded_at) in items {
        writer.serialize(ItemRecord::from_item(item, waste_recorded_at))?;
    }
    writer.flush()?;
    Ok(())
}
