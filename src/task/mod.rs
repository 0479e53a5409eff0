pub mod tss;
