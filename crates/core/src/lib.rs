pub mod shared {
    pub mod constants;
    pub mod frame_buffer;
    pub mod pixel_format;
    pub mod rational;
    pub mod reader_config;
    pub mod reader_error;
    pub mod stream_metadata;
}

pub mod overlay {
    pub mod domain {
        pub mod expression;
        pub mod filter_chain;
        pub mod overlay_config;
    }
}

pub mod capture {
    pub mod domain {
        pub mod frame_reader;
        pub mod media_backend;
        pub mod stream_selector;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod capture_reader;
    pub mod pipeline_logger;
    pub mod infrastructure {
        pub mod threaded_frame_pump;
    }
}
