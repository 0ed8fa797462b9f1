pub mod action;
pub mod bar;
pub mod option;
pub mod order;

pub use action::{Action, ActionKind};
pub use bar::{OhlcvBar, Series};
pub use option::{Greeks, Moneyness, OptionContract, OptionPosition, OptionSide, OptionType};
pub use order::{Order, OrderSide, OrderStatus, OrderType, SpotPosition};
