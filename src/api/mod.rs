pub mod elevenlabs;
pub mod facebook;
pub mod openai;
