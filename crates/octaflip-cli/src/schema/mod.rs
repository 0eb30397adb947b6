pub mod model_file;
