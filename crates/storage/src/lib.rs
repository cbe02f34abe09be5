/*!
# Contract VM Storage

In-memory collaborators for the contract VM core:

- [`MemoryChainState`] keeps currencies, balances, allowances and deployed
  contracts behind read/write locks and implements
  [`cvm_core_vm::ChainState`].
- [`EventBus`] records contract events and fans them out to subscribers.
- [`Genesis`] is the serde document a chain state can be seeded from.
*/

pub mod chain_state;
pub mod events;
pub mod genesis;

pub use chain_state::MemoryChainState;
pub use events::{ContractEvent, EventBus, MAX_EVENT_HISTORY};
pub use genesis::{Genesis, GenesisBalance};
