//! Simulated adapter for host tests
//!
//! Parses the command frames written to it, answers them the way the
//! adapter firmware does and models register-style devices with an
//! auto-incrementing cursor. Every host byte and every parsed command is
//! logged so tests can assert on exact wire traffic.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::vec::Vec;

use embassy_futures::yield_now;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use i2cdriver_protocol::command::RESYNC_BYTE;
use i2cdriver_protocol::{
    BusSpeed, Command, CommandError, DeviceStatus, Direction, SCAN_FIRST_ADDRESS, SCAN_LAST_ADDRESS,
};

const MEMORY_SIZE: usize = 0x1_0000;

/// Transport errors raised by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Host waited for a response the adapter never sends
    NoResponse,
}

impl embedded_io_async::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::TimedOut
    }
}

/// Command as seen by the simulated adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Status,
    Echo(u8),
    Speed(BusSpeed),
    Start(u8, Direction),
    Read(usize),
    Write(Vec<u8>),
    Stop,
    Reset,
    Scan,
    Pullups(u8),
}

struct SimDevice {
    memory: Vec<u8>,
    width: usize,
    cursor: usize,
    address_bytes: usize,
    nack_writes: bool,
    latency: usize,
}

impl SimDevice {
    fn write(&mut self, byte: u8) {
        if self.address_bytes < self.width {
            if self.address_bytes == 0 {
                self.cursor = 0;
            }
            self.cursor = ((self.cursor << 8) | byte as usize) % MEMORY_SIZE;
            self.address_bytes += 1;
        } else {
            self.memory[self.cursor] = byte;
            self.cursor = (self.cursor + 1) % MEMORY_SIZE;
        }
    }

    fn read(&mut self) -> u8 {
        let byte = self.memory[self.cursor];
        self.cursor = (self.cursor + 1) % MEMORY_SIZE;
        byte
    }
}

struct SimState {
    wire: Vec<u8>,
    events: Vec<Event>,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    devices: BTreeMap<u8, SimDevice>,
    open: Option<(u8, Direction)>,
    speed: BusSpeed,
    pullups: u8,
    hung_up: bool,
}

impl SimState {
    fn process(&mut self) {
        loop {
            if self.inbound.first() == Some(&RESYNC_BYTE) {
                self.inbound.remove(0);
                continue;
            }
            let (event, used) = match Command::decode(&self.inbound) {
                Ok((command, used)) => (Self::event(command), used),
                Err(CommandError::Incomplete) => return,
                Err(_) => (None, 1),
            };
            self.inbound.drain(..used);
            if let Some(event) = event {
                self.apply(event);
            }
        }
    }

    fn event(command: Command<'_>) -> Option<Event> {
        Some(match command {
            Command::Status => Event::Status,
            Command::Echo(byte) => Event::Echo(byte),
            Command::Speed(speed) => Event::Speed(speed),
            Command::Start { address, direction } => Event::Start(address, direction),
            Command::Read(n) => Event::Read(n as usize),
            Command::Write(data) => Event::Write(data.to_vec()),
            Command::Stop => Event::Stop,
            Command::Reset => Event::Reset,
            Command::Scan => Event::Scan,
            Command::Pullups(mask) => Event::Pullups(mask),
        })
    }

    fn open_device(&mut self, direction: Direction) -> Option<&mut SimDevice> {
        match self.open {
            Some((address, open)) if open == direction => self.devices.get_mut(&address),
            _ => None,
        }
    }

    fn apply(&mut self, event: Event) {
        match &event {
            Event::Status => {
                let record = self.status().encode().unwrap_or([b' '; 80]);
                self.outbound.extend(record);
            }
            Event::Echo(byte) => self.outbound.push_back(*byte),
            Event::Speed(speed) => self.speed = *speed,
            Event::Start(address, direction) => {
                let ack = match self.devices.get_mut(address) {
                    Some(device) => {
                        device.address_bytes = 0;
                        // Devices without register addressing restart at offset 0
                        if device.width == 0 {
                            device.cursor = 0;
                        }
                        true
                    }
                    None => false,
                };
                self.open = ack.then_some((*address, *direction));
                self.outbound.push_back(if ack { 0x03 } else { 0x02 });
            }
            Event::Read(n) => {
                for _ in 0..*n {
                    let byte = self
                        .open_device(Direction::Read)
                        .map_or(0xFF, SimDevice::read);
                    self.outbound.push_back(byte);
                }
            }
            Event::Write(data) => {
                let ack = match self.open_device(Direction::Write) {
                    Some(device) if !device.nack_writes => {
                        data.iter().for_each(|&byte| device.write(byte));
                        true
                    }
                    _ => false,
                };
                self.outbound.push_back(ack as u8);
            }
            Event::Stop | Event::Reset => self.open = None,
            Event::Scan => {
                for address in SCAN_FIRST_ADDRESS..=SCAN_LAST_ADDRESS {
                    let present = self.devices.contains_key(&address);
                    self.outbound.push_back(if present { b'1' } else { b'0' });
                }
            }
            Event::Pullups(mask) => self.pullups = *mask,
        }
        self.events.push(event);
    }

    fn status(&self) -> DeviceStatus {
        let mut status = DeviceStatus {
            identifier: heapless::String::new(),
            serial: heapless::String::new(),
            uptime: 2340,
            voltage: 4.976,
            current: 40.0,
            temperature: 25.2,
            mode: 'I',
            sda: 1,
            scl: 1,
            speed: self.speed.khz() as u16,
            pullups: self.pullups,
            crc: 0xdc7c,
        };
        let _ = status.identifier.push_str("i2cdriver1");
        let _ = status.serial.push_str("DO01JUOO");
        status
    }

    fn latency(&self) -> usize {
        self.open
            .and_then(|(address, _)| self.devices.get(&address))
            .map_or(0, |device| device.latency)
    }
}

/// Cloneable handle to one simulated adapter
#[derive(Clone)]
pub struct SimAdapter {
    state: Rc<RefCell<SimState>>,
}

impl SimAdapter {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                wire: Vec::new(),
                events: Vec::new(),
                inbound: Vec::new(),
                outbound: VecDeque::new(),
                devices: BTreeMap::new(),
                open: None,
                speed: BusSpeed::Fast,
                pullups: 0,
                hung_up: false,
            })),
        }
    }

    /// Attach a device with a `width`-byte register address and initial memory
    pub fn with_device(self, address: u8, width: usize, contents: &[u8]) -> Self {
        let mut memory = vec![0u8; MEMORY_SIZE];
        memory[..contents.len()].copy_from_slice(contents);
        self.state.borrow_mut().devices.insert(
            address,
            SimDevice {
                memory,
                width,
                cursor: 0,
                address_bytes: 0,
                nack_writes: false,
                latency: 0,
            },
        );
        self
    }

    /// Make every write to `address` go unacknowledged
    pub fn nack_writes(&self, address: u8) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(&address) {
            device.nack_writes = true;
        }
    }

    /// Yield this many times before every read while `address` is open
    pub fn set_latency(&self, address: u8, yields: usize) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(&address) {
            device.latency = yields;
        }
    }

    /// Make every later read report end of stream
    pub fn hang_up(&self) {
        self.state.borrow_mut().hung_up = true;
    }

    /// Forget the wire and command logs
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.wire.clear();
        state.events.clear();
    }

    /// Every byte the host has written
    pub fn wire(&self) -> Vec<u8> {
        self.state.borrow().wire.clone()
    }

    /// Every command the adapter has processed
    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    /// Starting addresses of every START, in order
    pub fn starts(&self) -> Vec<u8> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Start(address, _) => Some(*address),
                _ => None,
            })
            .collect()
    }

    pub fn memory(&self, address: u8, offset: usize, len: usize) -> Vec<u8> {
        self.state.borrow().devices[&address].memory[offset..offset + len].to_vec()
    }

    pub fn speed(&self) -> BusSpeed {
        self.state.borrow().speed
    }

    pub fn pullups(&self) -> u8 {
        self.state.borrow().pullups
    }
}

impl ErrorType for SimAdapter {
    type Error = SimError;
}

impl Read for SimAdapter {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SimError> {
        let latency = self.state.borrow().latency();
        for _ in 0..latency {
            yield_now().await;
        }

        let mut state = self.state.borrow_mut();
        if state.hung_up || buf.is_empty() {
            return Ok(0);
        }
        if state.outbound.is_empty() {
            return Err(SimError::NoResponse);
        }
        let mut count = 0;
        while count < buf.len() {
            match state.outbound.pop_front() {
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

impl Write for SimAdapter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, SimError> {
        let mut state = self.state.borrow_mut();
        state.wire.extend_from_slice(buf);
        state.inbound.extend_from_slice(buf);
        state.process();
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}
