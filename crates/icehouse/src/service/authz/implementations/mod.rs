pub mod allow_all;
