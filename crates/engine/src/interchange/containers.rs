use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use stowage_cargo::{Container, ContainerSpec, Dimensions};
use stowage_core::ContainerId;

use super::{parse_rows, reader, require_columns, InterchangeError, Parsed};

const COLUMNS: [&str; 5] = [
    "Container ID",
    "Zone",
    "Width(cm)",
    "Depth(cm)",
    "Height(height)",
];

#[derive(Debug, Serialize, Deserialize)]
struct ContainerRecord {
    #[serde(rename = "Container ID")]
    container_id: String,
    #[serde(rename = "Zone")]
    zone: String,
    #[serde(rename = "Width(cm)")]
    width: f64,
    #[serde(rename = "Depth(cm)")]
    depth: f64,
    #[serde(rename = "Height(height)")]
    height: f64,
}

impl ContainerRecord {
    fn into_spec(self) -> Result<ContainerSpec, String> {
        let spec = ContainerSpec {
            container_id: ContainerId::parse(self.container_id).map_err(|e| e.to_string())?,
            zone: self.zone,
            dimensions: Dimensions::new(self.width, self.depth, self.height)
                .map_err(|e| e.to_string())?,
        };
        spec.validate().map_err(|e| e.to_string())?;
        Ok(spec)
    }
}

pub fn read_containers<R: Read>(input: R) -> Result<Parsed<ContainerSpec>, InterchangeError> {
    let mut reader = reader(input);
    require_columns(&mut reader, &COLUMNS)?;
    Ok(parse_rows(reader, ContainerRecord::into_spec))
}

pub fn write_containers<'a, W, I>(output: W, containers: I) -> Result<(), InterchangeError>
where
    W: Write,
    I: IntoIterator<Item = &'a Container>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    writer.write_record(COLUMNS)?;
    for container in containers {
        let spec = container.spec();
        writer.serialize(ContainerRecord {
            container_id: spec.container_id.to_string(),
            zone: spec.zone.clone(),
            width: spec.dimensions.width,
            depth: spec.dimensions.depth,
            height: spec.dimensions.height,
        })?;
    }
    writer.flush()?;
    Ok(())
}
