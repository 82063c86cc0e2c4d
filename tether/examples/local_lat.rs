/// Latency Tool
///
/// A REP socket (RCVHWM 100) echoes `roundtrip-count` messages of
/// `message-size` bytes back to a REQ peer on another thread, which reports
/// the average one-way latency.
///
/// Usage: `cargo run --example local_lat -- <bind-to> <message-size> <roundtrip-count>`
use std::env;
use std::process;
use std::thread;
use std::time::Instant;
use tether::prelude::*;

fn main() -> Result<()> {
    tether::dev_tracing::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let [bind_to, message_size, roundtrip_count] = args.as_slice() else {
        println!("usage: local_lat <bind-to> <message-size> <roundtrip-count>");
        process::exit(1);
    };
    let (Ok(message_size), Ok(roundtrip_count)) =
        (message_size.parse::<usize>(), roundtrip_count.parse::<usize>())
    else {
        println!("message-size and roundtrip-count must be numbers");
        process::exit(1);
    };

    let ctx = Context::new()?;
    let rep = ctx.socket_with_options(
        SocketType::Rep,
        SocketOptions::default().with_recv_hwm(100),
    )?;
    rep.bind(bind_to)?;

    let req = ctx.socket(SocketType::Req)?;
    req.connect(bind_to)?;

    let elapsed = thread::scope(|s| -> Result<_> {
        let remote = s.spawn(|| -> Result<_> {
            let payload = Bytes::from(vec![0u8; message_size]);
            let start = Instant::now();
            for _ in 0..roundtrip_count {
                req.send(payload.clone())?;
                let reply = req.recv()?;
                debug_assert_eq!(reply.len(), message_size);
            }
            Ok(start.elapsed())
        });

        for _ in 0..roundtrip_count {
            let msg = rep.recv()?;
            rep.send(msg)?;
        }
        remote
            .join()
            .unwrap_or(Err(TetherError::InvalidState("requester thread panicked")))
    })?;

    let latency = elapsed.as_secs_f64() * 1_000_000.0 / (roundtrip_count.max(1) as f64 * 2.0);
    println!("message size: {message_size} [B]");
    println!("roundtrip count: {roundtrip_count}");
    println!("average latency: {latency:.3} [us]");

    ctx.terminate();
    Ok(())
}
