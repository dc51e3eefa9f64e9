mod driver;

pub use driver::{DatabaseDriver, DriverSession};
