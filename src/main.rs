#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use {defmt_rtt as _, panic_probe as _};

use mocap_node::{
    board::Board,
    config::SamplerConfig,
    tasks::{sampling_task, start_access_point, udp_task},
};

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting mocap-node with multi-priority executors");
    let board = Board::init();

    // High-priority executor for sampling (priority level 2)
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let spawner_high_priority = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    spawner_high_priority
        .spawn(sampling_task(board.i2c1, SamplerConfig::default()))
        .unwrap();
    info!("Sampling task spawned on interrupt executor");

    let stack = start_access_point(spawner, board.wifi_pwr, board.wifi_spi).await;
    spawner.spawn(udp_task(stack)).unwrap();
    info!("UDP task spawned on main executor");

    core::future::pending::<()>().await;
}
