//! CSV boundary: point input, crown and coloured-point output.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use csv::{Reader, Writer};

use crate::color::ColoredPoint;
use crate::error::Result;
use crate::hull::{CrownPolygon, ATTRIBUTE_COLUMNS};
use crate::point::{Point, PointCloud};

/// Reads a headed point CSV (PDAL dimension names).
pub fn read_points(path: impl AsRef<Path>) -> Result<PointCloud> {
    let file = File::open(path)?;
    read_points_from(BufReader::new(file))
}

pub fn read_points_from<R: Read>(reader: R) -> Result<PointCloud> {
    let mut rdr = Reader::from_reader(reader);
    let points = rdr
        .deserialize::<Point>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(PointCloud::new(points))
}

/// Storage collaborator for final crowns.
pub trait CrownSink {
    fn write_crowns(&mut self, crowns: &[CrownPolygon]) -> Result<()>;
}

/// Writes `id, cluster, <attributes>, crown_wkt` rows.
pub struct CsvCrownSink<W: Write> {
    writer: Writer<W>,
}

impl CsvCrownSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> CsvCrownSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::from_writer(inner),
        }
    }

    pub fn into_inner(self) -> std::result::Result<W, csv::IntoInnerError<Writer<W>>> {
        self.writer.into_inner()
    }
}

impl<W: Write> CrownSink for CsvCrownSink<W> {
    fn write_crowns(&mut self, crowns: &[CrownPolygon]) -> Result<()> {
        let mut header = vec!["id", "cluster"];
        header.extend(ATTRIBUTE_COLUMNS.iter().map(|(name, _)| *name));
        header.push("crown_wkt");
        self.writer.write_record(&header)?;

        for c in crowns {
            let mut row = vec![c.id.to_string(), c.cluster.to_string()];
            row.extend(ATTRIBUTE_COLUMNS.iter().map(|(_, get)| format!("{:.3}", get(c))));
            row.push(c.ring.to_wkt());
            self.writer.write_record(&row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes `id, X, Y, Z, ReturnNumber, Classification, Red, Green, Blue`,
/// with the crown label in the classification column.
pub fn write_colored_points<W: Write>(inner: W, points: &[ColoredPoint]) -> Result<()> {
    let mut wtr = Writer::from_writer(inner);
    wtr.write_record([
        "id",
        "X",
        "Y",
        "Z",
        "ReturnNumber",
        "Classification",
        "Red",
        "Green",
        "Blue",
    ])?;
    for p in points {
        wtr.write_record([
            p.id.to_string(),
            format!("{:.3}", p.x),
            format!("{:.3}", p.y),
            format!("{:.3}", p.z),
            p.return_number.to_string(),
            p.label.to_string(),
            p.rgb[0].to_string(),
            p.rgb[1].to_string(),
            p.rgb[2].to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Ring;

    #[test]
    fn reads_pdal_style_csv_with_optional_columns() {
        let text = "\
X,Y,Z,Classification,ReturnNumber,NumberOfReturns,Intensity,HeightAboveGround,Coplanar,NormalX,NormalY,NormalZ,Red,Green,Blue
1.5,2.5,12.0,1,1,3,200,11.0,0,0.1,0.0,0.99,10,20,30
4.0,5.0,0.2,2,1,1,80,0.0,1,0.0,0.0,1.0,,,
";
        let cloud = read_points_from(text.as_bytes()).unwrap();
        assert_eq!(cloud.len(), 2);
        let p = cloud.get(0);
        assert_eq!((p.x, p.y, p.z), (1.5, 2.5, 12.0));
        assert_eq!(p.number_of_returns, 3);
        assert_eq!(p.red, Some(10));
        assert!(cloud.get(1).is_ground());
        assert_eq!(cloud.get(1).blue, None);
    }

    #[test]
    fn crown_csv_has_attribute_columns_and_wkt() {
        let crown = CrownPolygon {
            id: 0,
            cluster: 5,
            ring: Ring::close(&[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)]),
            area: 2.0,
            n_points: 12,
            mean_z: 14.25,
            mean_hag: 13.0,
            mean_normal: [0.0, 0.0, 1.0],
            mean_coplanar: 0.5,
        };
        let mut sink = CsvCrownSink::new(Vec::new());
        sink.write_crowns(&[crown]).unwrap();
        let bytes = sink.into_inner().unwrap_or_else(|_| panic!("csv flush failed"));
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,cluster,mean_z,n_points,nx,ny,nz,coplanar,hag,area,crown_wkt"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("0,5,14.250,12.000,"));
        assert!(row.ends_with("\"POLYGON((0 0,2 0,0 2,0 0))\""));
    }
}
