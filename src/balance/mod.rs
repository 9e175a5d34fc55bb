pub mod ras;

pub use ras::{RasBalancer, RasResult};
