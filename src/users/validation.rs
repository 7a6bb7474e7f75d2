//! Input checks run by the HTTP layer before the credential service is called.

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::ServiceError;
use crate::users::dto::{LoginRequest, RegisterRequest, UpdateUserRequest};

const MAX_USERNAME_LEN: usize = 64;
/// bcrypt only reads this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn check_username(username: &str) -> Result<(), ServiceError> {
    if username.is_empty() {
        return Err(ServiceError::BadRequest("username should not be empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ServiceError::BadRequest(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), ServiceError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ServiceError::BadRequest("email must be an email".into()))
    }
}

fn check_password(password: &str) -> Result<(), ServiceError> {
    if password.is_empty() {
        return Err(ServiceError::BadRequest("password should not be empty".into()));
    }
    Ok(())
}

fn check_new_password(password: &str) -> Result<(), ServiceError> {
    check_password(password)?;
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ServiceError::BadRequest(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

pub fn register(mut req: RegisterRequest) -> Result<RegisterRequest, ServiceError> {
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_string();
    check_username(&req.username)?;
    check_email(&req.email)?;
    check_new_password(&req.password)?;
    Ok(req)
}

pub fn login(mut req: LoginRequest) -> Result<LoginRequest, ServiceError> {
    req.email = req.email.trim().to_string();
    check_email(&req.email)?;
    check_password(&req.password)?;
    Ok(req)
}

pub fn update(mut req: UpdateUserRequest) -> Result<UpdateUserRequest, ServiceError> {
    if req.username.is_none() && req.email.is_none() && req.password.is_none() {
        return Err(ServiceError::BadRequest("no fields to update".into()));
    }
    if let Some(username) = req.username.as_mut() {
        *username = username.trim().to_string();
        check_username(username)?;
    }
    if let Some(email) = req.email.as_mut() {
        *email = email.trim().to_string();
        check_email(email)?;
    }
    if let Some(password) = &req.password {
        check_new_password(password)?;
    }
    Ok(req)
}
