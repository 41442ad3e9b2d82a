//! Test and helper mocks for steer_core

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use steer_traits::{BoxError, EmcyCallback, EmcyMessage, ObjectChannel, RegisterMap};

type Key = (u16, u8);

#[derive(Default)]
struct Bank {
    registers: HashMap<Key, Vec<u8>>,
    writes: Vec<(u16, u8, Vec<u8>)>,
    reads: HashMap<Key, usize>,
    read_failures: HashMap<Key, u32>,
    write_failures: HashMap<Key, u32>,
    /// Scripted position actual values; `None` fails that read.
    positions: VecDeque<Option<i32>>,
    emcy: Option<EmcyCallback>,
}

/// In-memory object dictionary.
///
/// Reads return the last value written (or seeded). Position reads can be
/// scripted, and failures injected per object. Clones share the same bank,
/// so a test can keep a handle while the core owns the channel.
#[derive(Clone)]
pub struct MemoryChannel {
    bank: Arc<Mutex<Bank>>,
    map: RegisterMap,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    /// Seeded with status "switch on disabled", control word 0, position 0
    /// and profile position mode.
    pub fn new() -> Self {
        let map = RegisterMap::default();
        let ch = Self {
            bank: Arc::new(Mutex::new(Bank::default())),
            map,
        };
        ch.set_status_word(0x0140);
        ch.set_u16(map.control_word.index, map.control_word.subindex, 0);
        ch.set_position(0);
        ch.set_raw(map.op_mode.index, map.op_mode.subindex, vec![1]);
        ch
    }

    fn bank(&self) -> MutexGuard<'_, Bank> {
        self.bank.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_raw(&self, index: u16, subindex: u8, bytes: Vec<u8>) {
        self.bank().registers.insert((index, subindex), bytes);
    }

    pub fn raw(&self, index: u16, subindex: u8) -> Option<Vec<u8>> {
        self.bank().registers.get(&(index, subindex)).cloned()
    }

    pub fn set_u16(&self, index: u16, subindex: u8, v: u16) {
        self.set_raw(index, subindex, v.to_le_bytes().to_vec());
    }

    pub fn set_status_word(&self, sw: u16) {
        let a = self.map.status_word;
        self.set_u16(a.index, a.subindex, sw);
    }

    pub fn set_control_word(&self, cw: u16) {
        let a = self.map.control_word;
        self.set_u16(a.index, a.subindex, cw);
    }

    pub fn control_word(&self) -> Option<u16> {
        let a = self.map.control_word;
        self.raw(a.index, a.subindex)
            .and_then(|b| b.try_into().ok())
            .map(u16::from_le_bytes)
    }

    /// Position actual value returned once the script is exhausted.
    pub fn set_position(&self, qc: i32) {
        let a = self.map.position_actual;
        self.set_raw(a.index, a.subindex, qc.to_le_bytes().to_vec());
    }

    /// Queue position reads; `None` entries fail. The last successful value
    /// sticks once the queue drains.
    pub fn script_positions<I: IntoIterator<Item = Option<i32>>>(&self, seq: I) {
        self.bank().positions.extend(seq);
    }

    pub fn fail_reads(&self, index: u16, subindex: u8, n: u32) {
        self.bank().read_failures.insert((index, subindex), n);
    }

    pub fn fail_writes(&self, index: u16, subindex: u8, n: u32) {
        self.bank().write_failures.insert((index, subindex), n);
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(u16, u8, Vec<u8>)> {
        self.bank().writes.clone()
    }

    pub fn writes_to(&self, index: u16, subindex: u8) -> Vec<Vec<u8>> {
        self.bank()
            .writes
            .iter()
            .filter(|(i, s, _)| *i == index && *s == subindex)
            .map(|(_, _, d)| d.clone())
            .collect()
    }

    pub fn control_words_written(&self) -> Vec<u16> {
        let a = self.map.control_word;
        self.writes_to(a.index, a.subindex)
            .into_iter()
            .filter_map(|b| b.try_into().ok().map(u16::from_le_bytes))
            .collect()
    }

    pub fn position_settings_written(&self) -> Vec<i32> {
        let a = self.map.position_setting;
        self.writes_to(a.index, a.subindex)
            .into_iter()
            .filter_map(|b| b.try_into().ok().map(i32::from_le_bytes))
            .collect()
    }

    pub fn read_count(&self, index: u16, subindex: u8) -> usize {
        self.bank().reads.get(&(index, subindex)).copied().unwrap_or(0)
    }

    /// Deliver an EMCY frame to the registered listener, if any.
    pub fn emit_emcy(&self, msg: EmcyMessage) -> bool {
        let mut bank = self.bank();
        match bank.emcy.as_mut() {
            Some(cb) => {
                cb(msg);
                true
            }
            None => false,
        }
    }
}

fn take_failure(failures: &mut HashMap<Key, u32>, key: Key) -> bool {
    match failures.get_mut(&key) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

impl ObjectChannel for MemoryChannel {
    fn read(&mut self, index: u16, subindex: u8) -> Result<Vec<u8>, BoxError> {
        let key = (index, subindex);
        let pos = self.map.position_actual;
        let mut bank = self.bank();
        *bank.reads.entry(key).or_default() += 1;
        if take_failure(&mut bank.read_failures, key) {
            return Err(Box::new(std::io::Error::other("injected read failure")));
        }
        if key == (pos.index, pos.subindex)
            && let Some(next) = bank.positions.pop_front()
        {
            let Some(qc) = next else {
                return Err(Box::new(std::io::Error::other("scripted read failure")));
            };
            bank.registers.insert(key, qc.to_le_bytes().to_vec());
        }
        bank.registers
            .get(&key)
            .cloned()
            .ok_or_else(|| format!("object 0x{index:04X}:{subindex:02X} does not exist").into())
    }

    fn write(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), BoxError> {
        let key = (index, subindex);
        let mut bank = self.bank();
        if take_failure(&mut bank.write_failures, key) {
            return Err(Box::new(std::io::Error::other("injected write failure")));
        }
        bank.registers.insert(key, data.to_vec());
        bank.writes.push((index, subindex, data.to_vec()));
        Ok(())
    }

    fn register_map(&self) -> RegisterMap {
        self.map
    }

    fn on_emcy(&mut self, callback: EmcyCallback) {
        self.bank().emcy = Some(callback);
    }
}
