#![no_main]
#![no_std]

mod board;

use cortex_m::peripheral::SCB;
use embedded_hal::blocking::delay::DelayMs;
use groundhog_systick::GlobalRollingTimer;
use sprocket_uartboot::{
    consts::{BAUD_RATE, CORE_CLOCK_HZ, FAIL_CLOSED, SHUTDOWN_DELAY_MS},
    sprkt_log, BootConfig, BootMachine, Outcome,
};
use stm32g0xx_hal::{
    prelude::*,
    rcc::{Config, PllConfig, Prescaler},
    serial::BasicConfig,
    stm32,
};

use crate::board::G0Flash;

#[cfg(feature = "defmt-log")]
mod logging {
    use defmt_rtt as _; // global logger
    use groundhog::RollingTimer;
    use groundhog_systick::GlobalRollingTimer;
    use panic_probe as _;

    // same panicking *behavior* as `panic-probe` but doesn't print a panic message
    // this prevents the panic message being printed *twice* when `defmt::panic` is invoked
    #[defmt::panic_handler]
    fn panic() -> ! {
        cortex_m::asm::udf()
    }

    defmt::timestamp!("{=u32:ms}", GlobalRollingTimer::new().get_ticks());
}

#[cfg(not(feature = "defmt-log"))]
use panic_reset as _;

#[cortex_m_rt::exception]
fn SysTick() {
    GlobalRollingTimer::tick();
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let _ = inner_main();

    // Only reached if bring-up failed. Don't reboot TOO fast.
    cortex_m::asm::delay(8_000_000);
    SCB::sys_reset()
}

fn inner_main() -> Result<(), ()> {
    let board = stm32::Peripherals::take().ok_or(())?;
    let mut core = cortex_m::Peripherals::take().ok_or(())?;

    //
    // Step 1 - Power on PLL clocks, 64MHz from HSI16
    //
    let config = Config::pll()
        .pll_cfg(PllConfig::with_hsi(1, 8, 2))
        .ahb_psc(Prescaler::NotDivided)
        .apb_psc(Prescaler::NotDivided);
    let mut rcc = board.RCC.freeze(config);

    //
    // Step 2 - Start the tick source. Everything with a timeout needs it.
    //
    GlobalRollingTimer::init(&mut core.SYST, CORE_CLOCK_HZ);

    //
    // Step 3 - USART2 on PA2 (TX) / PA3 (RX)
    //
    let gpioa = board.GPIOA.split(&mut rcc);
    let serial = board
        .USART2
        .usart(
            gpioa.pa2,
            gpioa.pa3,
            BasicConfig::default().baudrate(BAUD_RATE.bps()),
            &mut rcc,
        )
        .map_err(|_| {
            sprkt_log!(error, "USART2 config rejected!");
        })?;

    //
    // Step 4 - Unlock Flash access
    //
    let flash = if let Ok(ulf) = board.FLASH.unlock() {
        sprkt_log!(info, "unlocked.");
        ulf
    } else {
        sprkt_log!(error, "Unlock failed!");
        return Err(());
    };

    //
    // Step 5 - Run one update session
    //
    let config = BootConfig::default();
    let app_base = config.app_base();

    sprkt_log!(info, "Launching bootloader!");

    let mut boot = BootMachine::new(
        serial,
        G0Flash::new(flash),
        GlobalRollingTimer::new(),
        config,
    );
    let outcome = boot.run();

    sprkt_log!(info, "Session over: {:?}", outcome);

    //
    // Step 6 - Let the last frame drain, then put back everything we touched
    //
    GlobalRollingTimer::new().delay_ms(SHUTDOWN_DELAY_MS);

    let (serial, flash) = boot.release();
    drop(serial);
    // Relocks on drop
    drop(flash.release());

    let rcc_regs = unsafe { &*stm32::RCC::ptr() };
    rcc_regs.apbrstr1.modify(|_, w| w.usart2rst().set_bit());
    rcc_regs.apbrstr1.modify(|_, w| w.usart2rst().clear_bit());
    rcc_regs.apbenr1.modify(|_, w| w.usart2en().clear_bit());

    GlobalRollingTimer::deinit(&mut core.SYST);

    if FAIL_CLOSED {
        if let Outcome::Failed(_) = outcome {
            sprkt_log!(warn, "Update failed, not trusting the application. Resetting.");
            SCB::sys_reset();
        }
    }

    //
    // Step 7 - Hand off to the application
    //
    sprkt_log!(info, "bootloading!");
    sprkt_log!(info, "APP: {=u32:X}", app_base);

    unsafe {
        core.SCB.vtor.write(app_base);
        cortex_m::asm::bootload(app_base as *const u32)
    }
}
