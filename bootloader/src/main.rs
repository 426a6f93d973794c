#![no_std]
#![no_main]

use ab_boot::{
    BootStatus, Bootloader, FirmwareEntry, NonVolatileMemory, PanicSignal, Region, RegionMap,
    SoftCrc,
};
use cortex_m_rt::{entry, exception};
#[cfg(feature = "defmt")]
use defmt_rtt as _;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::nvmc::{Nvmc, PAGE_SIZE};
#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use panic_probe as _;

const MAX_RETRIES: u8 = 3;
const ERASED_WORD: u32 = 0xFFFF_FFFF;

// Roughly 10 Hz at the default 64 MHz core clock.
const FAST_BLINK_CYCLES: u32 = 3_200_000;

mod regions {
    extern "C" {
        static __run_start: u32;
        static __run_end: u32;
        static __storage_start: u32;
        static __storage_end: u32;
    }

    pub fn run() -> core::ops::Range<u32> {
        let s = unsafe { core::ptr::addr_of!(__run_start) } as u32;
        let e = unsafe { core::ptr::addr_of!(__run_end) } as u32;
        s..e
    }

    pub fn storage() -> core::ops::Range<u32> {
        let s = unsafe { core::ptr::addr_of!(__storage_start) } as u32;
        let e = unsafe { core::ptr::addr_of!(__storage_end) } as u32;
        s..e
    }
}

/// Image at the start of each bank, end marker and checksum in the last two words.
fn region_map() -> RegionMap {
    let page = PAGE_SIZE as u32;
    let bank = |range: core::ops::Range<u32>| {
        Region::new(range.start, range.end, page)
            .with_end_marker(range.end - 8)
            .with_checksum(range.end - 4)
    };
    RegionMap::new(bank(regions::storage()), bank(regions::run()))
        .with_max_retries(MAX_RETRIES)
        .with_verify_writes(true)
}

/// Blinks the status LED forever.
struct BlinkPanic<'d> {
    led: Output<'d>,
}

impl PanicSignal for BlinkPanic<'_> {
    fn signal(&mut self, reason: BootStatus) -> ! {
        #[cfg(feature = "defmt")]
        defmt::error!("bootloader halted: {}", reason);
        #[cfg(not(feature = "defmt"))]
        let _ = reason;

        loop {
            self.led.toggle();
            cortex_m::asm::delay(FAST_BLINK_CYCLES);
        }
    }
}

/// Jumps to the vector table at the start of the Run bank.
struct JumpToRun {
    vector_table: u32,
}

impl FirmwareEntry for JumpToRun {
    fn transfer_control(&mut self) -> ! {
        unsafe {
            let mut p = cortex_m::Peripherals::steal();
            p.SCB.invalidate_icache();
            p.SCB.vtor.write(self.vector_table);
            cortex_m::asm::bootload(self.vector_table as *const u32)
        }
    }
}

#[entry]
fn main() -> ! {
    let p = embassy_nrf::init(Default::default());

    // Uncomment this if you are debugging the bootloader with debugger/RTT attached,
    // as it prevents a hard fault when accessing flash 'too early' after boot.
    /*
        for i in 0..10000000 {
            cortex_m::asm::nop();
        }
    */

    let map = region_map();
    let mut flash = Nvmc::new(p.NVMC);
    let mut crc = SoftCrc::new();
    let mut entry = JumpToRun {
        vector_table: map.run.start,
    };
    let mut panic = BlinkPanic {
        led: Output::new(p.P0_28, Level::High, OutputDrive::Standard),
    };

    // The staging side leaves the signature word programmed while an update is pending.
    // With nothing staged, the image already in Run is trusted and entered unchecked.
    let pending = flash
        .read_word(map.storage.signature)
        .map_or(false, |word| word != ERASED_WORD);
    if !pending {
        #[cfg(feature = "defmt")]
        defmt::info!("no staged image, booting run bank");
        entry.transfer_control()
    }

    match Bootloader::new(&map, &mut flash, &mut crc) {
        Ok(bootloader) => bootloader.boot(&mut entry, &mut panic),
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::error!("invalid region map: {}", _e);
            panic.signal(BootStatus::CopyError)
        }
    }
}

#[no_mangle]
#[cfg_attr(target_os = "none", link_section = ".HardFault.user")]
unsafe extern "C" fn HardFault() {
    cortex_m::peripheral::SCB::sys_reset();
}

#[exception]
unsafe fn DefaultHandler(_: i16) -> ! {
    const SCB_ICSR: *const u32 = 0xE000_ED04 as *const u32;
    let irqn = core::ptr::read_volatile(SCB_ICSR) as u8 as i16 - 16;

    panic!("DefaultHandler #{:?}", irqn);
}
