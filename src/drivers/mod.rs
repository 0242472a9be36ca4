pub mod procon2;
