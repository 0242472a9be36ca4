pub mod bridge;

#[cfg(test)]
mod bridge_test;
