// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-simulator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the Modbus TCP server of the simulator
//!
//! These tests start a server on an OS-assigned port and talk to it with a
//! real Modbus client: reads of the four tables, client writes, error
//! conditions, and a full daemon whose generators change values over time.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_modbus::prelude::*;

use modbus_simulator::config::{Config, SpecValue, SystemConfig};
use modbus_simulator::daemon::Daemon;
use modbus_simulator::modbus::{AddressSpace, ModbusDataBank, ModbusServerHandle};

/// Start a server on 127.0.0.1 with a port chosen by the OS
async fn start_test_server(
    bank: Arc<ModbusDataBank>,
) -> Result<ModbusServerHandle, Box<dyn std::error::Error>> {
    let server = ModbusServerHandle::start("127.0.0.1", 0, bank).await?;
    println!("Test server started on: {}", server.local_addr());
    Ok(server)
}

#[tokio::test]
async fn test_read_all_tables() -> Result<(), Box<dyn std::error::Error>> {
    let bank = Arc::new(ModbusDataBank::new());
    bank.set_holding_registers(100, &[5, -2])?;
    bank.set_coils(3, &[true])?;
    let server = start_test_server(bank).await?;

    let mut ctx = tcp::connect(server.local_addr()).await?;

    let data = ctx.read_holding_registers(100, 3).await??;
    assert_eq!(data, vec![5, 0xFFFE, 0]);

    let coils = ctx.read_coils(1, 4).await??;
    assert_eq!(coils, vec![false, false, true, false]);

    // Tables the simulator never writes still answer with zeros
    let inputs = ctx.read_input_registers(0, 4).await??;
    assert_eq!(inputs, vec![0; 4]);
    let discrete = ctx.read_discrete_inputs(10, 8).await??;
    assert_eq!(discrete, vec![false; 8]);

    // Upper end of the address range
    let last = ctx.read_holding_registers(65535, 1).await??;
    assert_eq!(last, vec![0]);

    ctx.disconnect().await?;
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_client_writes() -> Result<(), Box<dyn std::error::Error>> {
    let bank = Arc::new(ModbusDataBank::new());
    let server = start_test_server(bank.clone()).await?;

    let mut ctx = tcp::connect(server.local_addr()).await?;

    ctx.write_single_register(40, 1234).await??;
    ctx.write_multiple_registers(41, &[1, 2, 3]).await??;
    ctx.write_single_coil(7, true).await??;
    ctx.write_multiple_coils(8, &[true, false, true]).await??;

    let data = ctx.read_holding_registers(40, 4).await??;
    assert_eq!(data, vec![1234, 1, 2, 3]);
    let coils = ctx.read_coils(7, 4).await??;
    assert_eq!(coils, vec![true, true, false, true]);

    // Client writes land in the shared data bank
    assert_eq!(bank.holding_register(40), Some(1234));
    assert_eq!(bank.coil(10), Some(true));

    ctx.disconnect().await?;
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_error_conditions() -> Result<(), Box<dyn std::error::Error>> {
    let bank = Arc::new(ModbusDataBank::new());
    let server = start_test_server(bank).await?;

    let mut ctx = tcp::connect(server.local_addr()).await?;

    // Past the end of the address space
    let response = ctx.read_holding_registers(65535, 2).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    let response = ctx.write_multiple_registers(65535, &[1, 2]).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    // Unsupported function code
    let response = ctx.masked_write_register(0, 0xFF00, 0x0012).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalFunction));

    // The connection keeps serving after exceptions
    let data = ctx.read_holding_registers(0, 1).await??;
    assert_eq!(data, vec![0]);

    ctx.disconnect().await?;
    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_several_clients_share_the_bank() -> Result<(), Box<dyn std::error::Error>> {
    let bank = Arc::new(ModbusDataBank::new());
    let server = start_test_server(bank).await?;

    let mut writer = tcp::connect(server.local_addr()).await?;
    let mut reader = tcp::connect(server.local_addr()).await?;

    writer.write_single_register(5, 77).await??;
    let data = reader.read_holding_registers(5, 1).await??;
    assert_eq!(data, vec![77]);

    writer.disconnect().await?;
    reader.disconnect().await?;
    server.shutdown();
    Ok(())
}

fn daemon_config() -> Config {
    let registers: BTreeMap<u16, SpecValue> = [
        (100, SpecValue::Number(5)),
        (200, SpecValue::from("rand,0,10,0.05")),
        (300, SpecValue::from("risefall,500,500,0.05")),
    ]
    .into_iter()
    .collect();
    let coils: BTreeMap<u16, SpecValue> = [
        (1, SpecValue::from("toggle,0.1")),
        (3, SpecValue::Flag(true)),
    ]
    .into_iter()
    .collect();

    Config {
        system: SystemConfig {
            address: "127.0.0.1".to_string(),
            port: 0,
            tick_interval_ms: 10,
            ..SystemConfig::default()
        },
        registers,
        coils,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_serves_changing_values() -> Result<(), Box<dyn std::error::Error>> {
    let mut daemon = Daemon::new();
    daemon.launch(&daemon_config()).await?;
    let addr: SocketAddr = daemon.local_addr().ok_or("daemon has no listen address")?;

    let mut ctx = tcp::connect(addr).await?;

    // Give the tick loop a few rounds
    time::sleep(Duration::from_millis(100)).await;

    let fixed = ctx.read_holding_registers(100, 1).await??;
    assert_eq!(fixed, vec![5]);
    let flat_wave = ctx.read_holding_registers(300, 1).await??;
    assert_eq!(flat_wave, vec![500]);
    let fixed_coil = ctx.read_coils(3, 1).await??;
    assert_eq!(fixed_coil, vec![true]);

    // The random register stays in range and the toggled coil flips
    let mut coil_states = Vec::new();
    for _ in 0..10 {
        let value = ctx.read_holding_registers(200, 1).await??;
        assert!(value[0] <= 10, "register 200 out of range: {}", value[0]);
        coil_states.push(ctx.read_coils(1, 1).await??[0]);
        time::sleep(Duration::from_millis(60)).await;
    }
    assert!(coil_states.contains(&true));
    assert!(coil_states.contains(&false));

    // A client write to a fixed address sticks until the next write
    ctx.write_single_register(100, 42).await??;
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ctx.read_holding_registers(100, 1).await??, vec![42]);

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_daemon_rejects_bad_spec() {
    let mut config = daemon_config();
    config.registers.insert(7, SpecValue::from("rand,10,0,1"));

    let mut daemon = Daemon::new();
    let result = daemon.launch(&config).await;
    assert!(result.is_err());
    assert!(daemon.local_addr().is_none());
}

#[tokio::test]
async fn test_daemon_fails_when_port_is_taken() -> Result<(), Box<dyn std::error::Error>> {
    let bank = Arc::new(ModbusDataBank::new());
    let server = start_test_server(bank).await?;

    let mut config = daemon_config();
    config.system.port = server.local_addr().port();

    let mut daemon = Daemon::new();
    let result = daemon.launch(&config).await;
    assert!(result.is_err());

    server.shutdown();
    Ok(())
}
