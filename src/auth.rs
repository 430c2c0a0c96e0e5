//! Bearer-token issuance, verification, and claim-based authorization.

pub mod bearer;
pub mod claims;
pub mod policy;
pub mod token;

pub use claims::*;
pub use policy::*;
pub use token::{ParsedToken, TokenError, TokenService, pair::*, secret::*};
