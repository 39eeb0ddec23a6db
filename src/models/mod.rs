pub mod note;
pub mod user;

pub use note::{
    AttemptedChanges, ConflictResponse, CreateNoteRequest, Note, UpdateNoteRequest, UpdateOutcome,
};
pub use user::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, User};
