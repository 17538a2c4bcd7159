//! Внутрипроцессный брокер для тестов и локального запуска.

pub mod memory;

pub use memory::MemoryBroker;
