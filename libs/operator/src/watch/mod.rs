pub mod registrar;

pub use registrar::WatchRegistrar;
