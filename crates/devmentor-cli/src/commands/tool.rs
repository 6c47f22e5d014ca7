use anyhow::Result;
use devmentor_core::AppConfig;
use devmentor_errors::errors;
use devmentor_tools::{ToolHost, ToolServerClient};
use serde_json::{Value, json};
use std::time::Duration;

use crate::ToolArgs;
use crate::output::print_json;

pub(crate) fn parse_tool_arguments(tool: &str, raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| errors::invalid_tool_arguments(tool, &err.to_string()).into_error())?;
    if !value.is_object() {
        return Err(errors::invalid_tool_arguments(tool, "got a non-object value").into_error());
    }
    Ok(value)
}

pub(crate) fn run_tool(cfg: &AppConfig, args: ToolArgs, json_mode: bool) -> Result<()> {
    let arguments = parse_tool_arguments(&args.name, &args.args)?;
    let output = if args.remote {
        let client = ToolServerClient::new(
            cfg.network.tool_server_url(),
            Duration::from_secs(cfg.diagnostics.tool_call_timeout_seconds),
        )?;
        client.try_call_tool(&args.name, arguments)?
    } else {
        ToolHost::new().call(&args.name, &arguments)?
    };

    if json_mode {
        return print_json(&json!({
            "tool": args.name,
            "remote": args.remote,
            "output": output,
        }));
    }
    println!("{output}");
    Ok(())
}
