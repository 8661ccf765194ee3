//! Background callbacks example
//!
//! Worker threads push results through a channel; the main loop delivers
//! them on the runtime's thread.
//!
//! Run with: cargo run --example 02_background_callbacks -p tether-runtime

use std::thread;
use std::time::Duration;
use tether_runtime::async_runtime::runtime;
use tether_runtime::loopback::Loopback;
use tether_runtime::{Channel, Env, Result, Session, SessionConfig};

fn main() -> Result<()> {
    let host = Loopback::new();
    let session = Session::start(&host, SessionConfig::default())?;
    let env = session.enter(&host);

    let channel = Channel::with_config("workers", session.config());
    channel.open(&env)?;

    let report = channel.callback(|env: &Env<'_>, (worker, value): (usize, u64)| {
        let text: String = env.call_as("concat", (format!("worker {} -> ", worker), value.to_string()))?;
        println!("{}", text);
        Ok(())
    });

    thread::scope(|scope| {
        for worker in 0..4_usize {
            let report = &report;
            scope.spawn(move || {
                let value: u64 = (1..=10_u64).map(|n| n * worker as u64).sum();
                if let Err(err) = report((worker, value)) {
                    eprintln!("push failed: {}", err);
                }
            });
        }
    });

    let join = channel.after(Duration::from_millis(20), |_env| {
        println!("timer fired");
        Ok(())
    })?;
    match runtime().map(|rt| rt.block_on(join)) {
        Ok(Ok(Ok(handle))) => println!("timer delivered as callback {}", handle),
        Ok(Ok(Err(err))) => eprintln!("timer push failed: {}", err),
        Ok(Err(err)) => eprintln!("timer task failed: {}", err),
        Err(err) => eprintln!("no tokio runtime: {}", err),
    }

    // Plays the runtime's main loop
    let delivered = host.pump_until_idle();
    println!("relay ran {} time(s)", delivered.chunks);

    channel.close();
    Ok(())
}
