//! The emulation loop calls an unknown APDU handler. Expressed as a
//! capability with a single operation, `handle_apdu`, realized by a closed
//! set of tagged variants rather than open inheritance — the emulation
//! loop only ever drives one of these two profiles.

pub mod type4;
pub mod vault;

pub use type4::Type4State;
pub use vault::VaultState;

pub enum Dispatcher {
    Type4(Type4State),
    Vault(VaultState),
}

impl Dispatcher {
    pub fn type4(initial_message: Vec<u8>) -> Self {
        Dispatcher::Type4(Type4State::new(initial_message))
    }

    pub fn vault(initial_data: &[u8]) -> Self {
        Dispatcher::Vault(VaultState::new(initial_data))
    }

    pub fn handle_apdu(&mut self, apdu: &[u8]) -> Vec<u8> {
        match self {
            Dispatcher::Type4(state) => state.handle_apdu(apdu),
            Dispatcher::Vault(state) => state.handle_apdu(apdu),
        }
    }
}
