//! Ordered bridge between an asynchronous video decode engine and a consumer
//! that wants pictures in presentation order.
//!
//! A [`session::decoder_session::DecoderSession`] submits compressed access
//! units tagged with their presentation timestamp. The engine completes them
//! on its own threads in whatever order it likes; the
//! [`session::callback_bridge::CallbackBridge`] recovers each timestamp and
//! inserts the picture into a [`decode::domain::frame_queue::FrameQueue`],
//! from which consumers always pop the earliest pending picture.

pub mod decode {
    pub mod domain {
        pub mod decode_engine;
        pub mod decoded_frame;
        pub mod frame_queue;
        pub mod image_buffer;
        pub mod pts_tag;
    }
    pub mod infrastructure;
}

pub mod session {
    pub mod callback_bridge;
    pub mod decoder_session;
    pub mod lock_registration;
    pub mod session_error;
    pub mod session_observer;
}

pub mod shared {
    pub mod constants;
    pub mod decoder_config;
    pub mod hardware_status;
    pub mod pixel_format;
}
