//! Host-side simulation HAL
//!
//! In-memory implementation of the full capability bundle with manual
//! time control, used by unit tests, the end-to-end scenarios, and the
//! mission simulation binary. Deterministic: time advances only when
//! the caller says so.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::adc::{Adc, AdcChannel, ADC_FULL_SCALE};
use crate::clock::Clock;
use crate::flash::{FlashRegion, FlashStore};
use crate::gpio::{Gpio, Pin, PinDirection, PinPull};
use crate::i2c::{I2cBus, I2cBusId, MAGNETOMETER_ADDR};
use crate::uart::{Uart, UartPort};
use crate::wdt::{HwWatchdog, WdtMode, WDT_MAX_TIMEOUT_MS, WDT_MIN_TIMEOUT_MS};
use crate::{HalError, Result};

/// ADC reference voltage used by the simulated converter
const ADC_VREF: f64 = 3.3;

#[derive(Debug, Clone, Copy, Default)]
struct SimPin {
    configured: bool,
    direction: Option<PinDirection>,
    level: bool,
}

#[derive(Debug)]
struct SimWdt {
    initialised: bool,
    running: bool,
    timeout_ms: u32,
    last_kick_ms: u64,
    reset_flag: bool,
    warning_callback: Option<fn()>,
    warning_latched: bool,
}

/// Simulated board
#[derive(Debug)]
pub struct SimHal {
    time_ms: u64,
    pins: [SimPin; Pin::COUNT],
    adc_volts: [f64; AdcChannel::COUNT],
    mag_present: bool,
    mag_response: [u8; 6],
    i2c_fault: bool,
    uart_tx: Vec<u8>,
    uart_rx: VecDeque<u8>,
    flash: [Vec<u8>; FlashRegion::COUNT],
    flash_busy: bool,
    wdt: SimWdt,
}

impl Default for SimHal {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHal {
    /// Create a fresh board: time zero, flash erased, switches at rest
    #[must_use]
    pub fn new() -> Self {
        let flash = [
            vec![0xFF; FlashRegion::DeployState.nominal_size()],
            vec![0xFF; FlashRegion::MissionData.nominal_size()],
            vec![0xFF; FlashRegion::FaultLog.nominal_size()],
            vec![0xFF; FlashRegion::Backup.nominal_size()],
        ];
        Self {
            time_ms: 0,
            pins: [SimPin::default(); Pin::COUNT],
            adc_volts: [0.0; AdcChannel::COUNT],
            mag_present: true,
            mag_response: [0u8; 6],
            i2c_fault: false,
            uart_tx: Vec::new(),
            uart_rx: VecDeque::new(),
            flash,
            flash_busy: false,
            wdt: SimWdt {
                initialised: false,
                running: false,
                timeout_ms: 0,
                last_kick_ms: 0,
                reset_flag: false,
                warning_callback: None,
                warning_latched: false,
            },
        }
    }

    /// Advance simulated time
    pub fn advance_ms(&mut self, ms: u64) {
        self.time_ms += ms;
    }

    /// Drive an input pin from the simulated environment
    pub fn set_input_level(&mut self, pin: Pin, level: bool) {
        self.pins[pin.index()].level = level;
    }

    /// Current level of any pin, bypassing configuration checks
    #[must_use]
    pub fn pin_level(&self, pin: Pin) -> bool {
        self.pins[pin.index()].level
    }

    /// Set the raw bytes the magnetometer returns
    pub fn set_mag_response(&mut self, bytes: [u8; 6]) {
        self.mag_response = bytes;
    }

    /// Attach or detach the simulated magnetometer
    pub fn set_mag_present(&mut self, present: bool) {
        self.mag_present = present;
    }

    /// Inject or clear a stuck-bus fault on the I²C buses
    pub fn set_i2c_fault(&mut self, faulty: bool) {
        self.i2c_fault = faulty;
    }

    /// Set the voltage seen by an ADC channel
    pub fn set_adc_voltage(&mut self, channel: AdcChannel, volts: f64) {
        self.adc_volts[channel.index()] = volts;
    }

    /// Queue bytes for the UART receiver
    pub fn queue_uart_rx(&mut self, data: &[u8]) {
        self.uart_rx.extend(data.iter().copied());
    }

    /// Everything written to the UART so far
    #[must_use]
    pub fn uart_tx_data(&self) -> &[u8] {
        &self.uart_tx
    }

    /// Mark or clear the flash controller as busy
    pub fn set_flash_busy(&mut self, busy: bool) {
        self.flash_busy = busy;
    }

    /// Pretend the previous boot ended in a watchdog reset
    pub fn set_watchdog_reset_cause(&mut self, caused: bool) {
        self.wdt.reset_flag = caused;
    }

    /// Whether the watchdog deadline has passed without a kick
    #[must_use]
    pub fn watchdog_expired(&self) -> bool {
        self.wdt.running
            && self.time_ms.wrapping_sub(self.wdt.last_kick_ms) >= u64::from(self.wdt.timeout_ms)
    }

    /// Raise the early-warning event, as the silicon would; latched
    /// until the next [`HwWatchdog::warning_pending`] poll
    pub fn trigger_watchdog_warning(&mut self) {
        self.wdt.warning_latched = true;
    }

    /// Whether an early-warning callback is installed
    #[must_use]
    pub fn warning_callback_installed(&self) -> bool {
        self.wdt.warning_callback.is_some()
    }
}

impl Clock for SimHal {
    fn now_ms(&self) -> u64 {
        self.time_ms
    }

    fn now_us(&self) -> u64 {
        self.time_ms * 1_000
    }

    fn delay_ms(&mut self, ms: u32) {
        self.time_ms += u64::from(ms);
    }
}

impl Gpio for SimHal {
    fn config(&mut self, pin: Pin, direction: PinDirection, _pull: PinPull) -> Result<()> {
        let entry = &mut self.pins[pin.index()];
        entry.configured = true;
        entry.direction = Some(direction);
        if direction == PinDirection::Output {
            entry.level = false;
        }
        Ok(())
    }

    fn set(&mut self, pin: Pin, state: bool) -> Result<()> {
        let entry = &mut self.pins[pin.index()];
        if entry.direction != Some(PinDirection::Output) {
            return Err(HalError::NotConfigured);
        }
        entry.level = state;
        Ok(())
    }

    fn get(&self, pin: Pin) -> Result<bool> {
        let entry = &self.pins[pin.index()];
        if !entry.configured {
            return Err(HalError::NotConfigured);
        }
        Ok(entry.level)
    }

    fn toggle(&mut self, pin: Pin) -> Result<()> {
        let entry = &mut self.pins[pin.index()];
        if entry.direction != Some(PinDirection::Output) {
            return Err(HalError::NotConfigured);
        }
        entry.level = !entry.level;
        Ok(())
    }
}

impl I2cBus for SimHal {
    fn write(&mut self, _bus: I2cBusId, addr: u8, _data: &[u8]) -> Result<()> {
        if self.i2c_fault {
            return Err(HalError::BusError);
        }
        if addr == MAGNETOMETER_ADDR && self.mag_present {
            Ok(())
        } else {
            Err(HalError::Nak)
        }
    }

    fn read(&mut self, bus: I2cBusId, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.write_then_read(bus, addr, &[], buf)
    }

    fn write_then_read(
        &mut self,
        _bus: I2cBusId,
        addr: u8,
        _tx: &[u8],
        rx: &mut [u8],
    ) -> Result<()> {
        if self.i2c_fault {
            return Err(HalError::BusError);
        }
        if addr != MAGNETOMETER_ADDR || !self.mag_present {
            return Err(HalError::Nak);
        }
        let n = rx.len().min(self.mag_response.len());
        rx[..n].copy_from_slice(&self.mag_response[..n]);
        Ok(())
    }

    fn device_present(&mut self, _bus: I2cBusId, addr: u8) -> bool {
        !self.i2c_fault && addr == MAGNETOMETER_ADDR && self.mag_present
    }

    fn recover(&mut self, _bus: I2cBusId) -> Result<()> {
        self.i2c_fault = false;
        Ok(())
    }
}

impl Adc for SimHal {
    fn read_raw(&mut self, channel: AdcChannel) -> Result<u16> {
        let volts = self.adc_volts[channel.index()];
        let counts = (volts / ADC_VREF * f64::from(ADC_FULL_SCALE)).clamp(0.0, f64::from(ADC_FULL_SCALE));
        Ok(counts as u16)
    }

    fn read_voltage(&mut self, channel: AdcChannel) -> Result<f64> {
        Ok(self.adc_volts[channel.index()])
    }
}

impl Uart for SimHal {
    fn write(&mut self, _port: UartPort, data: &[u8]) -> Result<()> {
        self.uart_tx.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, _port: UartPort, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        if self.uart_rx.is_empty() {
            return Err(HalError::Timeout);
        }
        let _ = timeout_ms;
        let mut count = 0;
        while count < buf.len() {
            match self.uart_rx.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl FlashStore for SimHal {
    fn read(&mut self, region: FlashRegion, offset: usize, buf: &mut [u8]) -> Result<()> {
        if self.flash_busy {
            return Err(HalError::Busy);
        }
        let data = &self.flash[region.index()];
        let end = offset.checked_add(buf.len()).ok_or(HalError::OutOfBounds)?;
        if end > data.len() {
            return Err(HalError::OutOfBounds);
        }
        buf.copy_from_slice(&data[offset..end]);
        Ok(())
    }

    fn write(&mut self, region: FlashRegion, offset: usize, data: &[u8]) -> Result<()> {
        if self.flash_busy {
            return Err(HalError::Busy);
        }
        let store = &mut self.flash[region.index()];
        let end = offset.checked_add(data.len()).ok_or(HalError::OutOfBounds)?;
        if end > store.len() {
            return Err(HalError::OutOfBounds);
        }
        store[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, region: FlashRegion) -> Result<()> {
        if self.flash_busy {
            return Err(HalError::Busy);
        }
        self.flash[region.index()].fill(0xFF);
        Ok(())
    }

    fn region_size(&self, region: FlashRegion) -> usize {
        self.flash[region.index()].len()
    }
}

impl HwWatchdog for SimHal {
    fn init(&mut self, timeout_ms: u32, _mode: WdtMode) -> Result<()> {
        if !(WDT_MIN_TIMEOUT_MS..=WDT_MAX_TIMEOUT_MS).contains(&timeout_ms) {
            return Err(HalError::InvalidTimeout);
        }
        self.wdt.initialised = true;
        self.wdt.timeout_ms = timeout_ms;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.wdt.initialised {
            return Err(HalError::NotInitialised);
        }
        self.wdt.running = true;
        self.wdt.last_kick_ms = self.time_ms;
        Ok(())
    }

    fn kick(&mut self) {
        self.wdt.last_kick_ms = self.time_ms;
    }

    fn remaining_ms(&self) -> u32 {
        if !self.wdt.running {
            return 0;
        }
        let elapsed = self.time_ms.wrapping_sub(self.wdt.last_kick_ms);
        u64::from(self.wdt.timeout_ms).saturating_sub(elapsed) as u32
    }

    fn caused_reset(&self) -> bool {
        self.wdt.reset_flag
    }

    fn clear_reset_flag(&mut self) {
        self.wdt.reset_flag = false;
    }

    fn set_warning_callback(&mut self, callback: Option<fn()>) -> Result<()> {
        self.wdt.warning_callback = callback;
        Ok(())
    }

    fn warning_pending(&mut self) -> bool {
        core::mem::take(&mut self.wdt.warning_latched)
    }
}
