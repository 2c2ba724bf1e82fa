pub mod ffmpeg_backend;
pub mod ffmpeg_decoder;
pub mod ffmpeg_filter_graph;
pub mod ffmpeg_input;
pub mod ffmpeg_scaler;
pub mod resource_ledger;
pub mod synthetic_backend;
pub mod synthetic_graph;
mod yuv;
