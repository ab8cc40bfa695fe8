use std::fs;

use bytes::Bytes;

use amqmux_peer::{connect, ConnectionOptions};

use crate::cmd::SendArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;

    let options = ConnectionOptions {
        container_id: args.container_id.clone(),
        hostname: hostname_of(&args.addr),
        ..ConnectionOptions::default()
    };
    let mut connection =
        connect(args.addr.as_str(), options).map_err(|err| peer_error("connect failed", err))?;

    let (channel, handle) = connection.attach_sender(args.link.clone());
    connection
        .transfer(channel, handle, Bytes::from(payload))
        .map_err(|err| peer_error("send failed", err))?;
    connection.close();
    connection
        .run()
        .map_err(|err| peer_error("send failed", err))?;

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn hostname_of(addr: &str) -> Option<String> {
    addr.rsplit_once(':').map(|(host, _)| host.to_string())
}
