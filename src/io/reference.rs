//! Reference point tables as CSV: `x`, `y`, `class`, optional `random` and any
//! number of numeric attribute columns.
use std::path::Path;

use tracing::{info, warn};

use crate::core::classify::reference::{RANDOM_COLUMN, ReferencePoint, ReferenceSet};
use crate::error::{Error, Result};

const X: &str = "x";
const Y: &str = "y";
const CLASS: &str = "class";

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::Processing(format!("reference table has no `{}` column", name)))
}

fn parse_f64(value: &str, name: &str, line: u64) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Processing(format!("line {line}: `{name}` is not numeric: {value:?}")))
}

pub fn read_reference<R: std::io::Read>(reader: R) -> Result<ReferenceSet> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let (xi, yi, ci) = (column(&headers, X)?, column(&headers, Y)?, column(&headers, CLASS)?);
    let ri = headers.iter().position(|h| h.trim() == RANDOM_COLUMN);

    let mut points = Vec::new();
    let mut ignored: Vec<String> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let class_raw = parse_f64(&record[ci], CLASS, line)?;
        if class_raw.fract() != 0.0 {
            return Err(Error::Processing(format!("line {line}: class {class_raw} is not an integer")));
        }
        let mut p = ReferencePoint::new(
            parse_f64(&record[xi], X, line)?,
            parse_f64(&record[yi], Y, line)?,
            class_raw as i64,
        );
        if let Some(ri) = ri {
            p.random = Some(parse_f64(&record[ri], RANDOM_COLUMN, line)?);
        }
        for (i, (name, value)) in headers.iter().zip(record.iter()).enumerate() {
            if i == xi || i == yi || i == ci || Some(i) == ri || value.trim().is_empty() {
                continue;
            }
            match value.trim().parse::<f64>() {
                Ok(v) => {
                    p.properties.insert(name.trim().to_string(), v);
                }
                Err(_) if !ignored.iter().any(|n| n == name) => ignored.push(name.to_string()),
                Err(_) => {}
            }
        }
        points.push(p);
    }
    if !ignored.is_empty() {
        warn!("Ignoring non-numeric reference columns: {}", ignored.join(", "));
    }
    Ok(ReferenceSet::new(points))
}

pub fn read_reference_csv(path: &Path) -> Result<ReferenceSet> {
    let file = std::fs::File::open(path)?;
    let set = read_reference(file)?;
    info!("Reference table {}: {} points", path.display(), set.len());
    Ok(set)
}

/// Write `x`, `y`, `class`, `random` (when any point has it) and every
/// property column. Missing values are left empty.
pub fn write_reference<W: std::io::Write>(writer: W, set: &ReferenceSet) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let columns = set.property_columns();
    let with_random = set.points.iter().any(|p| p.random.is_some());

    let mut header = vec![X.to_string(), Y.to_string(), CLASS.to_string()];
    if with_random {
        header.push(RANDOM_COLUMN.to_string());
    }
    header.extend(columns.iter().cloned());
    wtr.write_record(&header)?;

    for p in &set.points {
        let mut row = vec![p.x.to_string(), p.y.to_string(), p.class.to_string()];
        if with_random {
            row.push(p.random.map(|r| r.to_string()).unwrap_or_default());
        }
        for c in &columns {
            row.push(p.properties.get(c).map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_reference_csv(path: &Path, set: &ReferenceSet) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_reference(std::fs::File::create(path)?, set)?;
    info!("Wrote {} rows to {}", set.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::reference::CLASSIFICATION_COLUMN;

    #[test]
    fn reads_coordinates_class_and_features() {
        let text = "x,y,class,NDVI,name\n1.5,2.5,3,0.8,palm\n4,5,0,,river\n";
        let set = read_reference(text.as_bytes()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.points[0].class, 3);
        assert_eq!(set.points[0].properties["NDVI"], 0.8);
        assert!(!set.points[1].properties.contains_key("NDVI"));
        assert!(!set.points[0].properties.contains_key("name"));
    }

    #[test]
    fn missing_class_column_fails() {
        assert!(read_reference("x,y,label\n1,2,3\n".as_bytes()).is_err());
    }

    #[test]
    fn fractional_class_fails() {
        assert!(read_reference("x,y,class\n1,2,3.5\n".as_bytes()).is_err());
    }

    #[test]
    fn written_table_reads_back() {
        let set = ReferenceSet::new(vec![
            ReferencePoint::new(1.0, 2.0, 4).with_property(CLASSIFICATION_COLUMN, 4.0),
            ReferencePoint::new(3.0, 4.0, 1),
        ])
        .random_column(Some(5));
        let mut buf = Vec::new();
        write_reference(&mut buf, &set).unwrap();
        let back = read_reference(buf.as_slice()).unwrap();
        assert_eq!(back.points[0].label(CLASSIFICATION_COLUMN), Some(4));
        assert_eq!(back.points[1].label(CLASSIFICATION_COLUMN), None);
        assert_eq!(back.points[0].random, set.points[0].random);
    }
}
