/// Monitor Example
///
/// Watches a PULL socket's lifecycle while draining its messages, with one
/// `select` loop over the socket and its monitor. Both sockets are closed
/// after "QUIT"; the loop ends on the monitor's CLOSED event.
use std::time::Duration;
use tether::prelude::*;

fn main() -> Result<()> {
    tether::dev_tracing::init_tracing();

    let ctx = Context::new()?;

    println!("Setting up connection for READ");
    let inbound = ctx.socket(SocketType::UPSTREAM)?;
    println!("Setting up monitor");
    let monitor = inbound.monitor(EventMask::ALL)?;
    inbound.bind("tcp://127.0.0.1:9000")?;

    let outbound = ctx.socket(SocketType::DOWNSTREAM)?;
    outbound.connect("tcp://127.0.0.1:9000")?;
    for msg in ["Hello World!", "Is anyone there?", "QUIT"] {
        println!("{:?}", outbound.send(msg));
    }

    let mut closed = false;
    loop {
        let items = [PollItem::readable(&inbound), PollItem::readable(&monitor)];
        let ready = select(&items, Some(Duration::from_secs(1)))?;

        if !closed && ready.is_readable(0) {
            if let Some(data) = inbound.try_recv()? {
                println!("{:?}", String::from_utf8_lossy(&data));
                if data == "QUIT" {
                    outbound.close()?;
                    inbound.close()?;
                    closed = true;
                }
            }
        }

        if ready.is_readable(1) || closed {
            match monitor.try_recv() {
                Ok(Some(event)) => {
                    println!("EVENT: {event}");
                    if event.kind() == EventKind::Closed {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    eprintln!("monitor: {err}");
                    break;
                }
            }
        }
    }

    Ok(())
}
