// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::error::Error;

use clap::Parser;
use log::{info, warn};
use tokio::time::{self, Duration};
use tokio_modbus::prelude::*;

/// Modbus client polling holding registers and coils of a running simulator
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Starting holding register address
    #[clap(long, default_value = "0")]
    register: u16,

    /// Number of holding registers to read (0 to skip)
    #[clap(long, default_value = "0")]
    register_count: u16,

    /// Starting coil address
    #[clap(long, default_value = "0")]
    coil: u16,

    /// Number of coils to read (0 to skip)
    #[clap(long, default_value = "0")]
    coil_count: u16,

    /// Milliseconds between two polls
    #[clap(long, default_value = "500")]
    interval_ms: u64,

    /// Number of polls, 0 to poll forever
    #[clap(long, default_value = "1")]
    polls: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr = format!("{}:{}", args.address, args.port).parse()?;
    info!("Connecting to Modbus server at {}", socket_addr);
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    let mut poll = 0u64;
    loop {
        poll += 1;

        if args.register_count > 0 {
            match ctx
                .read_holding_registers(args.register, args.register_count)
                .await?
            {
                Ok(words) => {
                    for (i, word) in words.iter().enumerate() {
                        let address = args.register as usize + i;
                        println!("register {} = {} (signed {})", address, word, *word as i16);
                    }
                }
                Err(code) => warn!("Reading holding registers failed: {:?}", code),
            }
        }

        if args.coil_count > 0 {
            match ctx.read_coils(args.coil, args.coil_count).await? {
                Ok(coils) => {
                    // Responses are padded to whole bytes
                    for (i, coil) in coils.iter().take(args.coil_count.into()).enumerate() {
                        println!("coil {} = {}", args.coil as usize + i, *coil as u8);
                    }
                }
                Err(code) => warn!("Reading coils failed: {:?}", code),
            }
        }

        if args.polls != 0 && poll >= args.polls {
            break;
        }
        time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    ctx.disconnect().await?;
    Ok(())
}
