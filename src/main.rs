#![no_std]
#![no_main]

use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::{self, InterruptExt};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, config::Config, peripherals};
use embassy_time::Delay;
use nrf_softdevice::Softdevice;
use panic_probe as _;
use static_cell::StaticCell;

use nrf52840_thermo_peripheral::ble::attribute::TEMPERATURE;
use nrf52840_thermo_peripheral::ble::events::{drain_forever, LinkEvent, LINK_EVENTS};
use nrf52840_thermo_peripheral::ble::link::ConnectionStateMachine;
use nrf52840_thermo_peripheral::ble::radio::{radio_task, SoftdeviceLink};
use nrf52840_thermo_peripheral::ble::server::{SoftdeviceStore, TemperatureServer};
use nrf52840_thermo_peripheral::config::{self, AdvertisingConfig, SensorConfig};
use nrf52840_thermo_peripheral::sensor::acquisition::Acquisition;
use nrf52840_thermo_peripheral::sensor::bus::I2cBus;

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

type SensorAcquisition = Acquisition<'static, I2cBus<Twim<'static>>, Delay, SoftdeviceStore>;

static TWIM_TX_BUFFER: StaticCell<[u8; 16]> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting nRF52840 S140 temperature peripheral");

    // Configure interrupt priorities to avoid SoftDevice reserved levels (0, 1, 4)
    let mut nrf_config = Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    // Bus pull-ups and sensor supply must be up before the first transfer
    let _bus_pullup = Output::new(p.P1_00, Level::High, OutputDrive::Standard);
    let _sensor_power = Output::new(p.P0_22, Level::High, OutputDrive::HighDrive);

    interrupt::TWISPI0.set_priority(interrupt::Priority::P3);
    let mut twim_config = twim::Config::default();
    twim_config.frequency = twim::Frequency::K100;
    let twim = Twim::new(
        p.TWISPI0,
        Irqs,
        p.P0_14,
        p.P0_15,
        twim_config,
        TWIM_TX_BUFFER.init([0; 16]),
    );

    let sd = Softdevice::enable(&config::softdevice_config());
    info!("SoftDevice enabled");

    // Service registration needs exclusive access, before the SoftDevice runs
    let server = TemperatureServer::new(sd);
    let sd: &'static Softdevice = sd;

    spawner.spawn(unwrap!(softdevice_task(sd)));

    let adv_config = AdvertisingConfig::default();
    let status = match server {
        Ok(server) => {
            let handle = server.value_handle();
            spawner.spawn(unwrap!(radio_task(sd, server, adv_config)));
            Ok(handle)
        }
        Err(e) => Err(e),
    };

    let acquisition = Acquisition::new(
        I2cBus::new(twim),
        Delay,
        SoftdeviceStore::new(sd),
        &TEMPERATURE,
        SensorConfig::default(),
    );
    spawner.spawn(unwrap!(acquisition_task(acquisition)));

    LINK_EVENTS.send(LinkEvent::StackInitialized(status)).await;

    info!("System initialized, processing link events");
    let mut machine = ConnectionStateMachine::new(SoftdeviceLink::new(), adv_config, &TEMPERATURE);
    drain_forever(&mut machine, LINK_EVENTS.receiver()).await
}

#[embassy_executor::task]
async fn acquisition_task(acquisition: SensorAcquisition) -> ! {
    acquisition.run().await
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}
