use std::io::{Read, Write};

use serde::Serialize;

use stowage_cargo::{BoundingBox, Container, Point3};
use stowage_core::{ContainerId, Entity, ItemId};

use super::{InterchangeError, Parsed, RowError};

const COLUMNS: [&str; 4] = [
    "Item ID",
    "Container ID",
    "Coordinates (W1,D1,H1)",
    "(W2,D2,H2)",
];

#[derive(Debug, Serialize)]
struct ArrangementRecord {
    item_id: String,
    container_id: String,
    start: String,
    end: String,
}

/// Which box an item occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrangementRow {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub position: BoundingBox,
}

/// Build a row from the raw fields of one record. The coordinate cells may
/// arrive quoted (`"(0,0,0)"`) or bare, in which case the reader has split
/// them on their inner commas; either way the tail must hold six numbers.
fn into_row(fields: &csv::StringRecord) -> Result<ArrangementRow, String> {
    let (item_id, container_id) = match (fields.get(0), fields.get(1)) {
        (Some(item), Some(container)) => (item, container),
        _ => return Err("expected item, container and two coordinates".into()),
    };
    let tail: Vec<&str> = fields.iter().skip(2).collect();
    let coordinates = tail.join(",");
    let values = numbers(&coordinates)?;
    let (start, end) = match values.as_slice() {
        [w1, d1, h1, w2, d2, h2] => (Point3::new(*w1, *d1, *h1), Point3::new(*w2, *d2, *h2)),
        _ => return Err(format!("expected two (w,d,h) coordinates, got '{coordinates}'")),
    };
    let position = BoundingBox::new(start, end).map_err(|e| e.to_string())?;
    Ok(ArrangementRow {
        item_id: ItemId::parse(item_id).map_err(|e| e.to_string())?,
        container_id: ContainerId::parse(container_id).map_err(|e| e.to_string())?,
        position,
    })
}

/// Comma separated numbers, parentheses ignored.
fn numbers(cell: &str) -> Result<Vec<f64>, String> {
    cell.split(',')
        .map(|v| v.trim().trim_start_matches('(').trim_end_matches(')').trim())
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| format!("bad coordinates '{cell}': {e}"))
}

/// The header is checked by position: its coordinate titles contain commas
/// and are usually written unquoted, so they never survive as single fields.
fn check_header(header: &csv::StringRecord) -> Result<(), InterchangeError> {
    for (n, column) in COLUMNS[..2].iter().enumerate() {
        if header.get(n) != Some(*column) {
            return Err(InterchangeError::MissingColumn(*column));
        }
    }
    let tail: Vec<&str> = header.iter().skip(2).collect();
    let tail = tail.join(",");
    if !tail.contains("W1,D1,H1") {
        return Err(InterchangeError::MissingColumn(COLUMNS[2]));
    }
    if !tail.contains("W2,D2,H2") {
        return Err(InterchangeError::MissingColumn(COLUMNS[3]));
    }
    Ok(())
}

fn format_point(p: &Point3) -> String {
    format!("({},{},{})", p.width, p.depth, p.height)
}

pub fn read_arrangement<R: Read>(input: R) -> Result<Parsed<ArrangementRow>, InterchangeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);
    let mut records = reader.records();
    let header = records
        .next()
        .transpose()?
        .ok_or(InterchangeError::MissingColumn(COLUMNS[0]))?;
    check_header(&header)?;

    let mut parsed = Parsed::default();
    for (n, record) in records.enumerate() {
        let row = n + 1;
        match record.map_err(|e| e.to_string()).and_then(|r| into_row(&r)) {
            Ok(value) => parsed.rows.push((row, value)),
            Err(message) => parsed.errors.push(RowError::new(row, message)),
        }
    }
    Ok(parsed)
}

/// Write one row per claim, stowed and waste alike, container by container.
pub fn write_arrangement<'a, W, I>(output: W, containers: I) -> Result<(), InterchangeError>
where
    W: Write,
    I: IntoIterator<Item = &'a Container>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    writer.write_record(COLUMNS)?;
    for container in containers {
        for (item_id, bbox) in container.claims() {
            writer.serialize(ArrangementRecord {
                item_id: item_id.to_string(),
                container_id: container.id().to_string(),
                start: format_point(&bbox.start),
                end: format_point(&bbox.end),
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_cargo::{ContainerSpec, Dimensions};

    #[test]
    fn parses_coordinates() {
        assert_eq!(numbers("(1.5, 0,20)").unwrap(), vec![1.5, 0.0, 20.0]);
        assert_eq!(numbers("0,1,2),(3,4,5").unwrap().len(), 6);
        assert!(numbers("(a,b,c)").is_err());
    }

    #[test]
    fn export_quotes_coordinates_and_round_trips() {
        let mut container = Container::new(ContainerSpec {
            container_id: ContainerId::from("contA"),
            zone: "Lab".into(),
            dimensions: Dimensions::new(100.0, 100.0, 100.0).unwrap(),
        })
        .unwrap();
        let bbox = BoundingBox::new(Point3::new(0.0, 10.0, 0.5), Point3::new(10.0, 20.0, 30.25)).unwrap();
        container.claim(ItemId::from("001"), bbox).unwrap();

        let mut out = Vec::new();
        write_arrangement(&mut out, [&container]).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains("\"(0,10,0.5)\""));

        let parsed = read_arrangement(out.as_slice()).unwrap();
        assert!(parsed.errors.is_empty());
        assert_eq!(
            parsed.rows[0].1,
            ArrangementRow {
                item_id: ItemId::from("001"),
                container_id: ContainerId::from("contA"),
                position: bbox,
            }
        );
    }

    #[test]
    fn reads_unquoted_header_and_coordinates() {
        let input = "\
Item ID,Container ID,Coordinates (W1,D1,H1),(W2,D2,H2)
001,contA,(0,0,0),(10,10,20)
002,contA,\"(10, 0, 0)\",\"(20,10,20)\"
003,contA,(0,0,0),(10,10)
";
        let parsed = read_arrangement(input.as_bytes()).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(
            parsed.rows[0].1.position,
            BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 20.0)).unwrap()
        );
        assert_eq!(parsed.rows[1].1.position.start, Point3::new(10.0, 0.0, 0.0));
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 3);
    }

    #[test]
    fn header_without_coordinates_is_rejected() {
        let err = read_arrangement("Item ID,Container ID\n001,contA\n".as_bytes()).unwrap_err();
        assert!(matches!(err, InterchangeError::MissingColumn("Coordinates (W1,D1,H1)")));
        let err = read_arrangement("".as_bytes()).unwrap_err();
        assert!(matches!(err, InterchangeError::MissingColumn("Item ID")));
    }

    #[test]
    fn inverted_boxes_are_row_errors() {
        let input = "\
Item ID,Container ID,Coordinates (W1,D1,H1),Coordinates (W2,D2,H2)
001,contA,\"(10,0,0)\",\"(0,10,10)\"
";
        let parsed = read_arrangement(input.as_bytes()).unwrap();
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.errors[0].row, 1);
    }
}
