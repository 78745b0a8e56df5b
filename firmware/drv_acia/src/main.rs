#![no_std]
#![no_main]

use panic_halt as _;

use core::sync::atomic::{AtomicUsize, Ordering};

use cortex_m_rt::entry;

use atsamd_hal as hal;
use hal::clock::GenericClockController;
use hal::fugit::RateExtU32;
use hal::gpio::Pins;
use hal::pac::Peripherals;
use hal::prelude::*;
use hal::sercom::{uart, IoSet1, Sercom0};

use drv_acia::{BusyWaiting, DriverAcia, HalAcia, Semaphore};

/// Kernel semaphore for a single-core target without a scheduler:
/// waiters sleep until the next interrupt and retry.
struct WfiSemaphore {
    count: AtomicUsize,
}

impl Semaphore for WfiSemaphore {
    fn new(initial: usize) -> Self {
        WfiSemaphore { count: AtomicUsize::new(initial) }
    }

    fn p(&self) {
        loop {
            let taken = self
                .count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok();
            if taken {
                return;
            }
            cortex_m::asm::wfi();
        }
    }

    fn v(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
        cortex_m::asm::sev();
    }
}

#[entry]
fn main() -> ! {
    let mut peripherals = Peripherals::take().unwrap();

    // Configure clocks
    let mut clocks = GenericClockController::with_internal_32kosc(
        peripherals.GCLK,
        &mut peripherals.MCLK,
        &mut peripherals.OSC32KCTRL,
        &mut peripherals.OSCCTRL,
        &mut peripherals.NVMCTRL,
    );

    let pins = Pins::new(peripherals.PORT);

    // =======================================================================
    // UART0 Setup (PA04 = TX / PAD0, PA05 = RX / PAD1)
    // =======================================================================

    let gclk0 = clocks.gclk0();
    let sercom0_clock = clocks.sercom0_core(&gclk0).unwrap();
    let pads = uart::Pads::<Sercom0, IoSet1>::default()
        .rx(pins.pa05)
        .tx(pins.pa04);
    let uart = uart::Config::new(&peripherals.MCLK, peripherals.SERCOM0, pads, sercom0_clock.freq())
        .baud(115_200.Hz(), uart::BaudMode::Fractional(uart::Oversampling::Bits16))
        .enable();

    let driver: DriverAcia<HalAcia<_>, WfiSemaphore, BusyWaiting> =
        DriverAcia::new(HalAcia::new(uart)).unwrap();

    // Status LED
    let mut led = pins.pa15.into_push_pull_output();
    led.set_high().unwrap();

    driver.send(b"ACIA echo ready");

    // =======================================================================
    // Main Loop: echo every received line back
    // =======================================================================

    let mut line = [0u8; drv_acia::BUFFER_SIZE];
    loop {
        let count = driver.receive(&mut line);
        led.toggle().ok();
        driver.send(&line[..count]);
    }
}
