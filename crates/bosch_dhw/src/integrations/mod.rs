pub mod bosch;
