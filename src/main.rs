//! # Cotask Example Firmware
//!
//! Runs the producer/consumer workload on the global kernel:
//!
//! | Task         | Role              | Period (ticks) |
//! |--------------|-------------------|----------------|
//! | `WORKERS[0]` | producer          | 125            |
//! | `WORKERS[1]` | producer          | 1000           |
//! | `WORKERS[2]` | consumer          | 250            |
//! | `WORKERS[3]` | consumer          | 750            |
//! | `WORKERS[4]` | adaptive consumer | 5000 / 75      |
//! | reporter     | logs the counters | 500            |
//!
//! At 1 kHz the producers outpace the fixed consumers, the buffer fills,
//! and the adaptive consumer switches to its burst period until the
//! buffer is half empty again.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use cotask::arch::cortex_m4;
use cotask::demo::{self, Pipeline, Role, Worker};
use cotask::kernel;
use cotask::mutex::MutexId;

static PIPELINE: Pipeline = Pipeline::new(MutexId::new(0));

static WORKERS: [Worker; 5] = [
    Worker::new(&PIPELINE, Role::Producer, 125),
    Worker::new(&PIPELINE, Role::Producer, 1000),
    Worker::new(&PIPELINE, Role::Consumer, 250),
    Worker::new(&PIPELINE, Role::Consumer, 750),
    Worker::new(&PIPELINE, Role::AdaptiveConsumer, 5000),
];

/// Firmware entry point. Registers the workload, starts the tick and
/// enters the dispatch loop. Does not return.
#[entry]
fn main() -> ! {
    let Some(mut cp) = cortex_m::Peripherals::take() else {
        loop {
            cortex_m::asm::wfi();
        }
    };

    let kernel = kernel::global();
    if demo::spawn(kernel, &PIPELINE, &WORKERS).is_err() {
        // task pool or timer queue too small for the workload
        loop {
            cortex_m::asm::wfi();
        }
    }

    cortex_m4::configure_systick(&mut cp.SYST);
    kernel.run()
}
