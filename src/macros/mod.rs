pub mod controller;
pub mod player;
pub mod recorder;
pub mod storage;

#[cfg(test)]
mod player_test;
#[cfg(test)]
mod recorder_test;
#[cfg(test)]
mod storage_test;
