//! Vector dataset I/O.
//!
//! The pipeline reads and writes row-based JSON vector files: one feature
//! per line, either a polygon (exterior ring plus holes) or a line string.
//! The format is inferred from the file extension; packaged container
//! formats are not supported here. A projection sidecar (`.prj`) next to
//! the baseline input is copied verbatim next to the output so downstream
//! GIS tools keep the reference system.

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),
}

/// Reads feature layers from a vector file.
pub trait VectorReader: Send + Sync {
    fn read_polygons(&self, path: &Path) -> Result<Vec<Polygon<f64>>, DatasetError>;
    fn read_lines(&self, path: &Path) -> Result<Vec<LineString<f64>>, DatasetError>;
}

/// Writes feature layers to a vector file.
pub trait VectorWriter: Send + Sync {
    fn write_polygons(&self, path: &Path, polygons: &[Polygon<f64>]) -> Result<(), DatasetError>;
    fn write_lines(&self, path: &Path, lines: &[LineString<f64>]) -> Result<(), DatasetError>;
}

/// Picks the dataset implementation for a path by extension.
pub fn dataset_for(path: &Path) -> Result<JsonDataset, DatasetError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") | Some("jsonl") => Ok(JsonDataset),
        other => Err(DatasetError::UnsupportedFormat(format!(
            "{} ({})",
            path.display(),
            other.unwrap_or("no extension")
        ))),
    }
}

/// Copies the `.prj` projection sidecar of `input` next to `output`, when
/// one exists. Missing sidecars are not an error.
pub fn copy_projection_sidecar(input: &Path, output: &Path) -> Result<(), DatasetError> {
    let source = input.with_extension("prj");
    if !source.exists() {
        return Ok(());
    }
    let target = output.with_extension("prj");
    fs::copy(&source, &target)?;
    debug!(from = %source.display(), to = %target.display(), "projection sidecar copied");
    Ok(())
}

/// One feature per line, kind-tagged.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Row {
    Polygon { rings: Vec<Vec<[f64; 2]>> },
    Line { points: Vec<[f64; 2]> },
}

/// Row-based JSON vector file.
pub struct JsonDataset;

impl JsonDataset {
    fn read_rows(&self, path: &Path) -> Result<Vec<Row>, DatasetError> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line)?);
        }
        Ok(rows)
    }

    fn write_rows(&self, path: &Path, rows: &[Row]) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(fs::File::create(path)?);
        for row in rows {
            serde_json::to_writer(&mut writer, row)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn ring_to_coords(ring: &[[f64; 2]]) -> LineString<f64> {
    LineString::new(
        ring.iter()
            .map(|&[x, y]| Coord { x, y })
            .collect(),
    )
}

fn coords_to_ring(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.0.iter().map(|c| [c.x, c.y]).collect()
}

impl VectorReader for JsonDataset {
    fn read_polygons(&self, path: &Path) -> Result<Vec<Polygon<f64>>, DatasetError> {
        let polygons = self
            .read_rows(path)?
            .into_iter()
            .filter_map(|row| match row {
                Row::Polygon { rings } => {
                    let mut rings = rings.iter();
                    let exterior = ring_to_coords(rings.next()?);
                    let interiors = rings.map(|r| ring_to_coords(r)).collect();
                    Some(Polygon::new(exterior, interiors))
                }
                Row::Line { .. } => None,
            })
            .collect();
        Ok(polygons)
    }

    fn read_lines(&self, path: &Path) -> Result<Vec<LineString<f64>>, DatasetError> {
        let lines = self
            .read_rows(path)?
            .into_iter()
            .filter_map(|row| match row {
                Row::Line { points } => Some(ring_to_coords(&points)),
                Row::Polygon { .. } => None,
            })
            .collect();
        Ok(lines)
    }
}

impl VectorWriter for JsonDataset {
    fn write_polygons(&self, path: &Path, polygons: &[Polygon<f64>]) -> Result<(), DatasetError> {
        let rows: Vec<Row> = polygons
            .iter()
            .map(|polygon| Row::Polygon {
                rings: std::iter::once(polygon.exterior())
                    .chain(polygon.interiors().iter())
                    .map(coords_to_ring)
                    .collect(),
            })
            .collect();
        self.write_rows(path, &rows)
    }

    fn write_lines(&self, path: &Path, lines: &[LineString<f64>]) -> Result<(), DatasetError> {
        let rows: Vec<Row> = lines
            .iter()
            .map(|line| Row::Line {
                points: coords_to_ring(line),
            })
            .collect();
        self.write_rows(path, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};
    use tempfile::tempdir;

    #[test]
    fn test_polygon_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("polygons.json");
        let polygons = vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]];

        JsonDataset.write_polygons(&path, &polygons).unwrap();
        let read = JsonDataset.read_polygons(&path).unwrap();
        assert_eq!(read, polygons);
    }

    #[test]
    fn test_polygon_with_hole_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("holed.json");
        let mut shell = polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ];
        shell.interiors_push(line_string![
            (x: 40.0, y: 40.0),
            (x: 60.0, y: 40.0),
            (x: 60.0, y: 60.0),
            (x: 40.0, y: 40.0),
        ]);

        JsonDataset.write_polygons(&path, &[shell.clone()]).unwrap();
        let read = JsonDataset.read_polygons(&path).unwrap();
        assert_eq!(read, vec![shell]);
    }

    #[test]
    fn test_line_roundtrip_and_layer_filter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lines.json");
        let lines = vec![line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 5.0)]];

        JsonDataset.write_lines(&path, &lines).unwrap();
        assert_eq!(JsonDataset.read_lines(&path).unwrap(), lines);
        // A line file holds no polygons.
        assert!(JsonDataset.read_polygons(&path).unwrap().is_empty());
    }

    #[test]
    fn test_format_inference() {
        assert!(dataset_for(Path::new("out.json")).is_ok());
        assert!(dataset_for(Path::new("out.jsonl")).is_ok());
        assert!(matches!(
            dataset_for(Path::new("out.gpkg")),
            Err(DatasetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_projection_sidecar_copy() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("baseline.json");
        let output = dir.path().join("result.json");
        fs::write(input.with_extension("prj"), "PROJCS[\"ETRS89\"]").unwrap();

        copy_projection_sidecar(&input, &output).unwrap();
        assert_eq!(
            fs::read_to_string(output.with_extension("prj")).unwrap(),
            "PROJCS[\"ETRS89\"]"
        );
    }

    #[test]
    fn test_missing_sidecar_is_fine() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("baseline.json");
        let output = dir.path().join("result.json");
        assert!(copy_projection_sidecar(&input, &output).is_ok());
    }
}
