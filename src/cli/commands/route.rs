use clap::Args;
use serde_json::{Map, Value};

use crate::cli::utils::output_record;
use crate::cli::OutputFormat;
use crate::handlers;
use crate::routing::{RouteTable, Router, Target};

#[derive(Args)]
pub struct RouteArgs {
    #[arg(help = "URL path, e.g. /edit-product/7")]
    pub path: String,

    #[arg(long, help = "Route file (defaults to ROUTES_FILE, then the bundled routes)")]
    pub routes: Option<String>,
}

pub fn handle(args: RouteArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let file = args
        .routes
        .or_else(|| crate::config::config().api.routes_file.clone());
    let router = Router::new(RouteTable::load(file.as_deref())?);

    output_record(&output_format, &describe(&router, &args.path))
}

/// Rewritten path plus the controller call it resolves to
pub fn describe(router: &Router, path: &str) -> Map<String, Value> {
    let rewritten = router.check_routes(path);
    let target = Target::parse(&rewritten);
    let registered = handlers::registry().contains(&target.controller);

    let mut record = Map::new();
    record.insert("path".to_string(), Value::String(path.to_string()));
    record.insert("rewritten".to_string(), Value::String(rewritten));
    record.insert("controller".to_string(), Value::String(target.controller));
    record.insert("action".to_string(), Value::String(target.action));
    record.insert(
        "args".to_string(),
        Value::Array(target.args.into_iter().map(Value::String).collect()),
    );
    record.insert("registered".to_string(), Value::Bool(registered));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describes_a_rewritten_path() {
        let router = Router::new(RouteTable::bundled().unwrap());
        let record = describe(&router, "/edit-product/7");
        assert_eq!(record["rewritten"], json!("/product/handleUpdateProduct/7"));
        assert_eq!(record["controller"], json!("product"));
        assert_eq!(record["args"], json!(["7"]));
        assert_eq!(record["registered"], json!(true));
    }

    #[test]
    fn flags_unknown_controllers() {
        let router = Router::new(RouteTable::new());
        let record = describe(&router, "/nowhere/at-all");
        assert_eq!(record["registered"], json!(false));
    }
}
