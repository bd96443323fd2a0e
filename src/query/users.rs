// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{NewUser, User, UserChange, UserId};
use crate::error::{AppError, AppResult};
use diesel::prelude::OptionalExtension as _;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

/// Emails are stored and looked up trimmed and lowercased.
pub fn normalize_email(address: &str) -> String {
    address.trim().to_lowercase()
}

fn email_taken(
    conn: &mut database::Connection,
    address: &str,
    except: Option<UserId>,
) -> AppResult<bool> {
    use database::schema::users::dsl::*;

    let owner: Option<UserId> = users
        .select(id)
        .filter(email.eq(address))
        .get_result(conn)
        .optional()?;
    Ok(owner.is_some() && owner != except)
}

fn email_taken_error() -> AppError {
    AppError::field("email", "taken", "このメールアドレスは既に登録されています")
}

/// A concurrent writer can still claim the address between check and write.
fn unique_email(error: DieselError) -> AppError {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)
            if info.message().contains("users.email") =>
        {
            email_taken_error()
        }
        e => e.into(),
    }
}

pub fn create_user(
    conn: &mut database::Connection,
    new_name: &str,
    new_email: &str,
    new_hash: &str,
) -> AppResult<User> {
    use database::schema::users::dsl::*;

    let address = normalize_email(new_email);
    let user = conn.immediate_transaction(|conn| {
        if email_taken(conn, &address, None)? {
            return Err(email_taken_error());
        }

        diesel::insert_into(users)
            .values(NewUser {
                name: new_name,
                email: Some(&address),
                password_hash: Some(new_hash),
                social_provider: None,
                social_id: None,
                image: None,
            })
            .returning(User::as_returning())
            .get_result(conn)
            .map_err(unique_email)
    })?;
    log::info!("registered user {}", user.id);
    Ok(user)
}

pub fn find_user(conn: &mut database::Connection, user_id: UserId) -> AppResult<User> {
    use database::schema::users::dsl::*;

    users
        .find(user_id)
        .select(User::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(AppError::NotFound)
}

pub fn find_user_by_email(
    conn: &mut database::Connection,
    find_email: &str,
) -> AppResult<Option<User>> {
    use database::schema::users::dsl::*;

    Ok(users
        .select(User::as_select())
        .filter(email.eq(normalize_email(find_email)))
        .get_result(conn)
        .optional()?)
}

/// What a social login provider tells us about the person signing in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialIdentity {
    pub provider: String,
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    /// Whether the provider confirmed the person owns `email`.
    pub email_verified: bool,
}

/// Returns the user linked to the identity, linking or creating one if needed.
/// An existing account gets the identity attached only when the provider
/// verified the email. Unverified emails are never stored.
pub fn find_or_create_social_user(
    conn: &mut database::Connection,
    identity: &SocialIdentity,
) -> AppResult<User> {
    use database::schema::users::dsl::*;

    conn.immediate_transaction(|conn| {
        let linked = users
            .select(User::as_select())
            .filter(social_provider.eq(&identity.provider))
            .filter(social_id.eq(&identity.id))
            .get_result(conn)
            .optional()?;
        if let Some(user) = linked {
            return Ok(user);
        }

        let verified_email = identity
            .email
            .as_deref()
            .filter(|_| identity.email_verified)
            .map(normalize_email);
        if let Some(address) = &verified_email {
            if let Some(existing) = find_user_by_email(conn, address)? {
                let user = diesel::update(users.find(existing.id))
                    .set((
                        social_provider.eq(&identity.provider),
                        social_id.eq(&identity.id),
                        updated_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .returning(User::as_returning())
                    .get_result(conn)?;
                log::info!("linked {} login to user {}", identity.provider, user.id);
                return Ok(user);
            }
        }

        let user = diesel::insert_into(users)
            .values(NewUser {
                name: &identity.name,
                email: verified_email.as_deref(),
                password_hash: None,
                social_provider: Some(&identity.provider),
                social_id: Some(&identity.id),
                image: None,
            })
            .returning(User::as_returning())
            .get_result(conn)?;
        log::info!("registered user {} via {}", user.id, identity.provider);
        Ok(user)
    })
}

pub fn update_profile(
    conn: &mut database::Connection,
    user_id: UserId,
    new_name: Option<&str>,
    new_email: Option<&str>,
) -> AppResult<User> {
    use database::schema::users::dsl::*;

    let address = new_email.map(normalize_email);
    conn.immediate_transaction(|conn| {
        if let Some(address) = &address {
            if email_taken(conn, address, Some(user_id))? {
                return Err(email_taken_error());
            }
        }

        let change = UserChange {
            name: new_name,
            email: address.as_deref(),
            updated_at: Some(chrono::Utc::now().naive_utc()),
        };
        diesel::update(users.find(user_id))
            .set(&change)
            .returning(User::as_returning())
            .get_result(conn)
            .optional()
            .map_err(unique_email)?
            .ok_or(AppError::NotFound)
    })
}

/// Returns the previous image so the caller can remove it from storage.
pub fn set_profile_image(
    conn: &mut database::Connection,
    user_id: UserId,
    path: &str,
) -> AppResult<Option<String>> {
    use database::schema::users::dsl::*;

    let previous = find_user(conn, user_id)?.image;
    diesel::update(users.find(user_id))
        .set((image.eq(path), updated_at.eq(chrono::Utc::now().naive_utc())))
        .execute(conn)?;
    Ok(previous)
}

#[cfg(test)]
pub fn test_user(conn: &mut database::Connection, name: &str) -> User {
    create_user(conn, name, &format!("{name}@example.com"), "not a real hash").unwrap()
}

#[test]
fn duplicate_email_is_a_field_error() {
    let mut conn = database::test_connection();
    test_user(&mut conn, "hana");

    let error = create_user(&mut conn, "hana2", "hana@example.com", "x").unwrap_err();
    let AppError::Validation(errors) = error else {
        panic!("expected validation error");
    };
    assert!(errors.field_errors().contains_key("email"));
}

#[test]
fn social_login_links_existing_email() {
    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");

    let identity = SocialIdentity {
        provider: "google".into(),
        id: "g-123".into(),
        name: "Hana Google".into(),
        email: Some("Hana@Example.com".into()),
        email_verified: true,
    };
    let linked = find_or_create_social_user(&mut conn, &identity).unwrap();
    assert_eq!(linked.id, hana.id);
    assert_eq!(linked.social_provider.as_deref(), Some("google"));

    // signing in again finds the same user without relying on the email
    let identity = SocialIdentity {
        email: None,
        ..identity
    };
    assert_eq!(find_or_create_social_user(&mut conn, &identity).unwrap().id, hana.id);

    let stranger = SocialIdentity {
        provider: "google".into(),
        id: "g-456".into(),
        name: "Taro".into(),
        email: None,
        email_verified: false,
    };
    let created = find_or_create_social_user(&mut conn, &stranger).unwrap();
    assert_ne!(created.id, hana.id);
    assert_eq!(created.name, "Taro");
}

#[test]
fn update_profile_and_image() {
    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");
    test_user(&mut conn, "taro");

    let updated = update_profile(&mut conn, hana.id, Some("はな"), None).unwrap();
    assert_eq!(updated.name, "はな");
    assert_eq!(updated.email.as_deref(), Some("hana@example.com"));

    assert!(update_profile(&mut conn, hana.id, None, Some("taro@example.com")).is_err());
    // keeping your own address is fine
    update_profile(&mut conn, hana.id, None, Some("hana@example.com")).unwrap();

    assert_eq!(set_profile_image(&mut conn, hana.id, "users/a.png").unwrap(), None);
    assert_eq!(
        set_profile_image(&mut conn, hana.id, "users/b.png").unwrap().as_deref(),
        Some("users/a.png")
    );
}

#[test]
fn unverified_social_email_is_not_linked() {
    let mut conn = database::test_connection();
    let hana = test_user(&mut conn, "hana");

    let impostor = SocialIdentity {
        provider: "github".into(),
        id: "gh-9".into(),
        name: "not hana".into(),
        email: Some("hana@example.com".into()),
        email_verified: false,
    };
    let created = find_or_create_social_user(&mut conn, &impostor).unwrap();
    assert_ne!(created.id, hana.id);
    assert_eq!(created.email, None);

    let hana = find_user(&mut conn, hana.id).unwrap();
    assert_eq!(hana.social_provider, None);
    assert_eq!(hana.email.as_deref(), Some("hana@example.com"));
}

#[test]
fn emails_are_case_insensitive() {
    let mut conn = database::test_connection();
    let hana = create_user(&mut conn, "hana", " Hana@Example.COM ", "x").unwrap();
    assert_eq!(hana.email.as_deref(), Some("hana@example.com"));

    let error = create_user(&mut conn, "hana2", "HANA@example.com", "x").unwrap_err();
    assert!(matches!(error, AppError::Validation(_)));
    assert_eq!(
        find_user_by_email(&mut conn, "hana@EXAMPLE.com").unwrap().map(|u| u.id),
        Some(hana.id)
    );

    // the constraint itself is reported the same way
    let taro = test_user(&mut conn, "taro");
    let error = {
        use database::schema::users::dsl::*;
        diesel::update(users.find(taro.id))
            .set(email.eq("hana@example.com"))
            .execute(&mut conn)
            .map_err(unique_email)
            .unwrap_err()
    };
    let AppError::Validation(errors) = error else {
        panic!("expected validation error");
    };
    assert!(errors.field_errors().contains_key("email"));
}
