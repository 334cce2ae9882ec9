use crate::channel::{Port, Ports, Producer, Stage};
use crate::config::ArbiterConfig;
use crate::error::ConfigError;
use crate::word::StreamWord;
use tracing::trace;

/// Merges several word streams onto one, a whole packet at a time.
///
/// Every input port has a one-word register. Once a port is granted it keeps the output
/// until its end-of-packet word has left; only then is the next port chosen, scanning
/// round-robin from the port after the last grant. A grant is made on `tick` and again
/// as soon as a packet's last word is popped.
pub struct Arbiter {
    registers: Vec<Option<StreamWord>>,
    update_id: bool,
    grant: Option<usize>,
    last_grant: usize,
    grants: Vec<u64>,
}

impl Arbiter {
    pub fn new(config: &ArbiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Arbiter {
            registers: vec![None; config.ports],
            update_id: config.update_id,
            grant: None,
            // First scan starts at port 0.
            last_grant: config.ports - 1,
            grants: vec![0; config.ports],
        })
    }

    pub fn ports(&self) -> usize {
        self.registers.len()
    }

    /// Input `index` as a `Consumer`.
    pub fn port(&mut self, index: usize) -> Port<'_, Self> {
        assert!(
            index < self.ports(),
            "Arbiter port {} out of range 0..{}",
            index,
            self.ports()
        );
        Port::new(self, index)
    }

    pub fn granted(&self) -> Option<usize> {
        self.grant
    }

    /// Grants issued to each port so far.
    pub fn grants(&self) -> &[u64] {
        &self.grants
    }

    fn arbitrate(&mut self) {
        if self.grant.is_some() {
            return;
        }
        let ports = self.ports();
        let next = (1..=ports)
            .map(|offset| (self.last_grant + offset) % ports)
            .find(|&port| self.registers[port].is_some());
        if let Some(port) = next {
            trace!(port, "grant");
            self.grant = Some(port);
            self.last_grant = port;
            self.grants[port] += 1;
        }
    }
}

impl Ports<StreamWord> for Arbiter {
    fn port_ready(&self, port: usize) -> bool {
        self.registers[port].is_none()
    }

    fn port_push(&mut self, port: usize, mut word: StreamWord) -> Result<(), StreamWord> {
        if self.registers[port].is_some() {
            return Err(word);
        }
        if self.update_id {
            word.id = port as u8;
        }
        self.registers[port] = Some(word);
        Ok(())
    }
}

impl Producer<StreamWord> for Arbiter {
    fn peek(&self) -> Option<&StreamWord> {
        self.grant.and_then(|port| self.registers[port].as_ref())
    }

    fn pop(&mut self) -> Option<StreamWord> {
        let port = self.grant?;
        let word = self.registers[port].take()?;
        if word.last {
            self.grant = None;
            self.arbitrate();
        }
        Some(word)
    }
}

impl Stage for Arbiter {
    fn tick(&mut self) {
        self.arbitrate();
    }

    fn busy(&self) -> bool {
        self.grant.is_some() || self.registers.iter().any(Option::is_some)
    }
}
