use serde_json::{Map, Value};

use crate::cli::OutputFormat;

/// Print `data` as pretty JSON, or each of its keys as `key: value` lines
pub fn output_record(output_format: &OutputFormat, data: &Map<String, Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Text => {
            for (key, value) in data {
                match value {
                    Value::String(s) => println!("{}: {}", key, s),
                    Value::Array(items) if items.is_empty() => println!("{}: (none)", key),
                    Value::Array(items) => {
                        println!("{}:", key);
                        for item in items {
                            match item {
                                Value::String(s) => println!("  - {}", s),
                                other => println!("  - {}", other),
                            }
                        }
                    }
                    other => println!("{}: {}", key, other),
                }
            }
        }
    }
    Ok(())
}

/// Read a file, or stdin when `path` is `-`
pub fn read_input(path: &str) -> anyhow::Result<String> {
    use anyhow::Context;
    use std::io::Read;

    if path == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))
    }
}
