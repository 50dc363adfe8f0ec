//! Authentication helpers: JWT issuing and decoding, password hashing and
//! the [`CurrentUser`] extractor.

pub mod extractor;
pub mod jwt;
pub mod password;

pub use extractor::CurrentUser;
pub use jwt::{
    create_access_token, create_refresh_token, decode_token, Claims, JwtConfig, JwtError,
    TokenType,
};
pub use password::{hash_password, verify_password, PasswordError};
