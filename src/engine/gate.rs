//! Account gate consulted before every document flow

use crate::db::{UserRepo, UserStatus};

/// Outcome of checking whether a phone number may use the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Inactive,
    NotFound,
    NotDriveLinked,
    /// The user store could not be read
    Unavailable,
}

impl AccountStatus {
    /// Reply sent when the flow is refused, `None` for active accounts
    #[must_use]
    pub const fn refusal(self) -> Option<&'static str> {
        match self {
            Self::Active => None,
            Self::NotFound => Some("User not found , Please Login in our App"),
            Self::Inactive => {
                Some("Your account is inactive. Please contact the admin to activate your account.")
            }
            Self::NotDriveLinked => Some(
                "Your account is not connected to Google Drive. Please connect your account to Google Drive to continue.",
            ),
            Self::Unavailable => Some("Something went wrong. Please try again later."),
        }
    }
}

/// Check the account behind `phone`
///
/// Fails closed: a store error yields [`AccountStatus::Unavailable`].
pub fn check_status(users: &UserRepo, phone: &str) -> AccountStatus {
    match users.find_by_phone(phone) {
        Ok(None) => AccountStatus::NotFound,
        Ok(Some(user)) if user.status == UserStatus::Inactive => AccountStatus::Inactive,
        Ok(Some(user)) if !user.is_drive_linked() => AccountStatus::NotDriveLinked,
        Ok(Some(_)) => AccountStatus::Active,
        Err(e) => {
            tracing::error!(phone, error = %e, "account status check failed");
            AccountStatus::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn test_gate_outcomes() {
        let users = UserRepo::new(init_memory().unwrap());
        assert_eq!(check_status(&users, "1555"), AccountStatus::NotFound);

        users.create("1555", None).unwrap();
        assert_eq!(check_status(&users, "1555"), AccountStatus::NotDriveLinked);

        users.set_drive_tokens("1555", "tok", None, None).unwrap();
        assert_eq!(check_status(&users, "1555"), AccountStatus::Active);
        assert!(AccountStatus::Active.refusal().is_none());

        users.set_status("1555", UserStatus::Inactive).unwrap();
        assert_eq!(check_status(&users, "1555"), AccountStatus::Inactive);
        assert!(
            AccountStatus::Inactive
                .refusal()
                .is_some_and(|m| m.contains("inactive"))
        );
    }
}
