pub mod disk;

pub use disk::DiskIndexStore;
