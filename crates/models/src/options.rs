//! Catalog of commonly used ODM processing options served on `GET /options`.

use serde::Serialize;

/// One entry of the NodeODM options catalog.
#[derive(Debug, Clone, Serialize)]
pub struct OdmOption {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub option_type: &'static str,
    pub value: &'static str,
    pub domain: &'static str,
    pub help: &'static str,
}

/// The advertised subset of ODM command line options. The process container
/// accepts the full ODM flag set; this list only drives client UIs.
pub fn odm_options() -> Vec<OdmOption> {
    vec![
        OdmOption {
            name: "fast-orthophoto",
            option_type: "bool",
            value: "false",
            domain: "bool",
            help: "Skips dense reconstruction and 3D model generation",
        },
        OdmOption {
            name: "dsm",
            option_type: "bool",
            value: "false",
            domain: "bool",
            help: "Use this tag to build a Digital Surface Model",
        },
        OdmOption {
            name: "dtm",
            option_type: "bool",
            value: "false",
            domain: "bool",
            help: "Use this tag to build a Digital Terrain Model",
        },
        OdmOption {
            name: "orthophoto-resolution",
            option_type: "float",
            value: "5",
            domain: "float > 0",
            help: "Orthophoto resolution in cm/pixel",
        },
        OdmOption {
            name: "dem-resolution",
            option_type: "float",
            value: "5",
            domain: "float > 0",
            help: "DEM resolution in cm/pixel",
        },
        OdmOption {
            name: "pc-quality",
            option_type: "string",
            value: "medium",
            domain: "ultra | high | medium | low | lowest",
            help: "Point cloud quality; higher values take longer",
        },
        OdmOption {
            name: "feature-quality",
            option_type: "string",
            value: "high",
            domain: "ultra | high | medium | low | lowest",
            help: "Feature extraction quality; higher values take longer",
        },
        OdmOption {
            name: "min-num-features",
            option_type: "int",
            value: "10000",
            domain: "integer",
            help: "Minimum number of features to extract per image",
        },
        OdmOption {
            name: "skip-3dmodel",
            option_type: "bool",
            value: "false",
            domain: "bool",
            help: "Skip generation of a full 3D model",
        },
        OdmOption {
            name: "use-gps",
            option_type: "bool",
            value: "false",
            domain: "bool",
            help: "Use image GPS exif data for reconstruction even with GCPs",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_names() {
        let options = odm_options();
        let mut names: Vec<_> = options.iter().map(|o| o.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), options.len());
    }

    #[test]
    fn catalog_serializes_nodeodm_shape() {
        let json = serde_json::to_value(odm_options()).unwrap();
        let first = &json[0];
        assert!(first.get("name").is_some());
        assert!(first.get("type").is_some());
        assert!(first.get("domain").is_some());
        assert!(first.get("help").is_some());
    }
}
