pub mod options;
pub mod spot;

pub use options::{
    OPTIONS_STRATEGY_NAMES, OptionsStrategy, StrategyCtx, build_options_strategy,
    options_strategy_description,
};
pub use spot::{SpotStrategy, StrategyOutput};
