/// Pipeline Example
///
/// A DOWNSTREAM (PUSH) socket feeds an UPSTREAM (PULL) socket until it sends
/// "QUIT".
///
/// Run with `RUST_LOG=debug` to see the lifecycle traces.
use tether::prelude::*;

fn main() -> Result<()> {
    tether::dev_tracing::init_tracing();

    let ctx = Context::new()?;

    println!("Opening connection for READ");
    let inbound = ctx.socket(SocketType::UPSTREAM)?;
    inbound.bind("tcp://127.0.0.1:9000")?;

    let outbound = ctx.socket(SocketType::DOWNSTREAM)?;
    outbound.connect("tcp://127.0.0.1:9000")?;
    println!("{:?}", outbound.send("Hello World!"));
    println!("{:?}", outbound.send("QUIT"));

    loop {
        let data = inbound.recv()?;
        println!("{:?}", String::from_utf8_lossy(&data));
        if data == "QUIT" {
            break;
        }
    }

    ctx.terminate();
    Ok(())
}
