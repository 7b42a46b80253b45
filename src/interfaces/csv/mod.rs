pub mod stop_reader;
