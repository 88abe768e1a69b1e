//! Request validation: S3 path normalization and the translation between
//! NodeODM option objects and ODM command line flags.

use scaleodm_models::{ScaleOdmError, TaskNewRequest, TaskOption};

/// Flags applied when a submission carries no options at all.
pub fn default_flags() -> Vec<String> {
    vec!["--fast-orthophoto".to_string()]
}

/// Resolve the read and write prefixes for a submission.
///
/// `readS3Path` wins; the write prefix defaults to an `output/` subdirectory
/// under it. The legacy `zipurl` is accepted only when it is itself an
/// `s3://` prefix. Both results carry exactly one trailing slash.
pub fn resolve_paths(request: &TaskNewRequest) -> Result<(String, String), ScaleOdmError> {
    let read_s3_path = request.read_s3_path.as_deref().map(str::trim).unwrap_or("");
    let write_s3_path = request.write_s3_path.as_deref().map(str::trim).unwrap_or("");
    let zipurl = request.zipurl.as_deref().map(str::trim).unwrap_or("");

    let (read_path, write_path) = if !read_s3_path.is_empty() {
        let read_path = normalize_prefix(read_s3_path);
        let write_path = if !write_s3_path.is_empty() {
            normalize_prefix(write_s3_path)
        } else {
            format!("{read_path}output/")
        };
        (read_path, write_path)
    } else if !zipurl.is_empty() {
        if zipurl.starts_with("s3://") {
            let base = zipurl.trim_end_matches('/');
            (normalize_prefix(zipurl), format!("{base}-output/"))
        } else if zipurl.starts_with("http://") || zipurl.starts_with("https://") {
            return Err(ScaleOdmError::Validation {
                reason: "HTTP zip URLs not supported. Use readS3Path for S3-based processing"
                    .to_string(),
            });
        } else {
            return Err(ScaleOdmError::Validation {
                reason: "zipurl must be an s3://... prefix".to_string(),
            });
        }
    } else {
        return Err(ScaleOdmError::Validation {
            reason: "readS3Path is required (or zipurl for legacy support)".to_string(),
        });
    };

    if !read_path.starts_with("s3://") {
        return Err(ScaleOdmError::Validation {
            reason: "readS3Path must be an s3:// path".to_string(),
        });
    }
    if !write_path.starts_with("s3://") {
        return Err(ScaleOdmError::Validation {
            reason: "writeS3Path must be an s3:// path".to_string(),
        });
    }

    Ok((read_path, write_path))
}

/// Normalize a prefix to exactly one trailing slash.
fn normalize_prefix(path: &str) -> String {
    format!("{}/", path.trim().trim_end_matches('/'))
}

/// Parse the `options` field, a JSON array of `{name, value}` objects.
pub fn parse_options(raw: &str) -> Result<Vec<TaskOption>, ScaleOdmError> {
    serde_json::from_str(raw).map_err(|e| ScaleOdmError::Validation {
        reason: format!("invalid options JSON: {e}"),
    })
}

/// Translate options into ODM CLI flags: a true boolean becomes `--name`, a
/// non-boolean value becomes `--name <value>`, false and null are omitted.
pub fn options_to_flags(options: &[TaskOption]) -> Vec<String> {
    let mut flags = Vec::new();
    for option in options {
        match &option.value {
            serde_json::Value::Null | serde_json::Value::Bool(false) => {}
            serde_json::Value::Bool(true) => flags.push(format!("--{}", option.name)),
            serde_json::Value::String(value) => {
                flags.push(format!("--{}", option.name));
                flags.push(value.clone());
            }
            other => {
                flags.push(format!("--{}", option.name));
                flags.push(other.to_string());
            }
        }
    }
    flags
}

/// Rebuild the options view from stored flags: each `--name` reads back as
/// `{name, true}`; flag arguments carry no option of their own.
pub fn flags_to_options(flags: &[String]) -> Vec<TaskOption> {
    flags
        .iter()
        .filter(|flag| flag.starts_with("--"))
        .map(|flag| TaskOption {
            name: flag.trim_start_matches('-').to_string(),
            value: serde_json::Value::Bool(true),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(read: Option<&str>, write: Option<&str>, zipurl: Option<&str>) -> TaskNewRequest {
        TaskNewRequest {
            read_s3_path: read.map(str::to_string),
            write_s3_path: write.map(str::to_string),
            zipurl: zipurl.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn read_path_gets_one_trailing_slash() {
        for input in ["s3://b/in", "s3://b/in/", "s3://b/in//", " s3://b/in "] {
            let (read, _) = resolve_paths(&request(Some(input), None, None)).unwrap();
            assert_eq!(read, "s3://b/in/", "input {input:?}");
        }
    }

    #[test]
    fn write_path_defaults_to_output_subdirectory() {
        let (_, write) = resolve_paths(&request(Some("s3://b/in"), None, None)).unwrap();
        assert_eq!(write, "s3://b/in/output/");

        let (_, write) =
            resolve_paths(&request(Some("s3://b/in"), Some("s3://other/out"), None)).unwrap();
        assert_eq!(write, "s3://other/out/");
    }

    #[test]
    fn s3_zipurl_is_accepted() {
        let (read, write) = resolve_paths(&request(None, None, Some("s3://b/archive"))).unwrap();
        assert_eq!(read, "s3://b/archive/");
        assert_eq!(write, "s3://b/archive-output/");
    }

    #[test]
    fn http_zipurl_is_rejected() {
        let err = resolve_paths(&request(None, None, Some("https://example.com/x.zip")))
            .unwrap_err();
        assert!(matches!(err, ScaleOdmError::Validation { .. }));
    }

    #[test]
    fn missing_read_path_is_rejected() {
        let err = resolve_paths(&request(None, None, None)).unwrap_err();
        assert!(matches!(err, ScaleOdmError::Validation { .. }));
    }

    #[test]
    fn non_s3_read_path_is_rejected() {
        let err = resolve_paths(&request(Some("gs://b/in"), None, None)).unwrap_err();
        assert!(matches!(err, ScaleOdmError::Validation { .. }));
    }

    #[test]
    fn options_translate_to_flags() {
        let options = vec![
            TaskOption {
                name: "fast-orthophoto".into(),
                value: serde_json::json!(true),
            },
            TaskOption {
                name: "dsm".into(),
                value: serde_json::json!(false),
            },
            TaskOption {
                name: "orthophoto-resolution".into(),
                value: serde_json::json!(5),
            },
            TaskOption {
                name: "pc-quality".into(),
                value: serde_json::json!("high"),
            },
        ];
        assert_eq!(
            options_to_flags(&options),
            vec![
                "--fast-orthophoto",
                "--orthophoto-resolution",
                "5",
                "--pc-quality",
                "high"
            ]
        );
    }

    #[test]
    fn boolean_options_round_trip() {
        let submitted = vec![TaskOption {
            name: "dsm".into(),
            value: serde_json::json!(true),
        }];
        let flags = options_to_flags(&submitted);
        assert_eq!(flags, vec!["--dsm"]);
        assert_eq!(flags_to_options(&flags), submitted);
    }

    #[test]
    fn flag_arguments_do_not_become_options() {
        let flags = vec![
            "--orthophoto-resolution".to_string(),
            "5".to_string(),
            "--dsm".to_string(),
        ];
        let options = flags_to_options(&flags);
        let names: Vec<_> = options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["orthophoto-resolution", "dsm"]);
        assert!(options.iter().all(|o| o.value == serde_json::json!(true)));
    }

    #[test]
    fn invalid_options_json_is_rejected() {
        assert!(parse_options("not json").is_err());
        assert!(parse_options("[{\"name\":\"dsm\",\"value\":true}]").is_ok());
    }
}
