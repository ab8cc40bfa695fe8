use amqmux_codec::ProtocolHeader;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    let version = env!("CARGO_PKG_VERSION");
    if !args.extended {
        println!("amqmux {version}");
        return Ok(SUCCESS);
    }

    println!("name: amqmux");
    println!("version: {version}");
    println!("protocol: {}", ProtocolHeader::amqp());
    println!("target: {}-{}", std::env::consts::ARCH, std::env::consts::OS);

    Ok(SUCCESS)
}
