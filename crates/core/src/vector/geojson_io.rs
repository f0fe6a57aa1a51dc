//! GeoJSON parsing for ROI and training inputs.

use geo::Geometry;
use geojson::{Feature, GeoJson};

use crate::error::{Error, Result};
use crate::vector::ClassCode;

fn parse(text: &str) -> Result<Vec<Feature>> {
    let gj: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::Geometry(format!("GeoJSON parse error: {e}")))?;

    Ok(match gj {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    })
}

fn to_geo(feature: &Feature, index: usize) -> Result<Geometry<f64>> {
    let geometry = feature
        .geometry
        .clone()
        .ok_or_else(|| Error::Geometry(format!("feature {index} has no geometry")))?;
    Geometry::<f64>::try_from(geometry)
        .map_err(|e| Error::Geometry(format!("feature {index}: {e}")))
}

/// All geometries in a GeoJSON document (geometry, feature or collection).
pub fn read_geometries(text: &str) -> Result<Vec<Geometry<f64>>> {
    parse(text)?
        .iter()
        .enumerate()
        .map(|(i, f)| to_geo(f, i))
        .collect()
}

/// Geometries paired with the integer class stored in `property`.
///
/// Class values may be JSON integers or integral floats (`2.0`); anything
/// outside `0..=254` is rejected.
pub fn read_labeled_features(text: &str, property: &str) -> Result<Vec<(Geometry<f64>, ClassCode)>> {
    parse(text)?
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let value = f.property(property).ok_or_else(|| {
                Error::Geometry(format!("feature {i} is missing property '{property}'"))
            })?;
            let code = value
                .as_u64()
                .or_else(|| value.as_f64().filter(|v| v.fract() == 0.0 && *v >= 0.0).map(|v| v as u64))
                .filter(|&c| c < u8::MAX as u64)
                .ok_or_else(|| Error::Geometry(format!("feature {i}: invalid class value {value}")))?;
            Ok((to_geo(f, i)?, code as ClassCode))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINING: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"Class": 0},
         "geometry": {"type": "Point", "coordinates": [86.40, 23.75]}},
        {"type": "Feature", "properties": {"Class": 3.0},
         "geometry": {"type": "Polygon", "coordinates": [[[86.1, 23.1], [86.2, 23.1], [86.2, 23.2], [86.1, 23.1]]]}}
      ]
    }"#;

    #[test]
    fn reads_class_property() {
        let features = read_labeled_features(TRAINING, "Class").unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].1, 0);
        assert_eq!(features[1].1, 3);
        assert!(matches!(features[0].0, Geometry::Point(_)));
    }

    #[test]
    fn missing_or_bad_class_is_an_error() {
        assert!(read_labeled_features(TRAINING, "label").is_err());
        let bad = TRAINING.replace("\"Class\": 0", "\"Class\": -1");
        assert!(read_labeled_features(&bad, "Class").is_err());
    }

    #[test]
    fn bare_geometry_document() {
        let geoms = read_geometries(
            r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}"#,
        )
        .unwrap();
        assert_eq!(geoms.len(), 1);
        assert!(read_geometries("not json").is_err());
    }
}
