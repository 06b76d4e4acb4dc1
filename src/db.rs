//! MySQL column helpers
//!
//! Status-like enums are stored as plain `VARCHAR` columns. sqlx's derived
//! enum codec only accepts MySQL `ENUM` columns, so these types encode and
//! decode through `str` instead, using their `as_str` / `FromStr` pair.

/// Implement `sqlx::Type`, `Decode` and `Encode` for MySQL through `str`.
///
/// The type must provide `fn as_str(&self) -> &'static str` and
/// `FromStr<Err = crate::Error>`.
macro_rules! mysql_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::MySql> for $ty {
            fn type_info() -> sqlx::mysql::MySqlTypeInfo {
                <str as sqlx::Type<sqlx::MySql>>::type_info()
            }

            fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::MySql>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::MySql> for $ty {
            fn decode(
                value: sqlx::mysql::MySqlValueRef<'r>,
            ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
                let text = <&str as sqlx::Decode<'r, sqlx::MySql>>::decode(value)?;
                Ok(text.parse::<$ty>()?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::MySql> for $ty {
            fn encode_by_ref(&self, buf: &mut Vec<u8>) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::MySql>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use mysql_text_enum;
