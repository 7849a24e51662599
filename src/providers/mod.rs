pub mod openexchangerates;

pub use openexchangerates::OpenExchangeRatesProvider;
