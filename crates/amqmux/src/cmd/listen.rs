use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use amqmux_peer::{ConnectionListener, Container, EventKind};

use crate::cmd::ListenArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let container = match &args.container_id {
        Some(id) => Container::with_id(id.clone()),
        None => Container::new(),
    };
    let listener = ConnectionListener::bind_with_container(&args.addr, container)
        .map_err(|err| peer_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let printed = Arc::new(AtomicUsize::new(0));
    {
        let printed = Arc::clone(&printed);
        listener.container().on(EventKind::Message, move |context| {
            print_message(context, format);
            printed.fetch_add(1, Ordering::SeqCst);
        });
    }

    while running.load(Ordering::SeqCst) {
        let mut connection = match listener.accept() {
            Ok(connection) => connection,
            Err(err) => return Err(peer_error("accept failed", err)),
        };
        info!(connection = connection.id(), "connection accepted");

        // A misbehaving peer tears down its own connection, not the
        // listener.
        if let Err(err) = connection.run() {
            warn!(connection = connection.id(), error = %err, "connection ended with error");
        }

        if let Some(count) = args.count {
            if printed.load(Ordering::SeqCst) >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
