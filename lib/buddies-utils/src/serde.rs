use serde::Serializer;

pub fn serialize_datetime<S: Serializer, T: chrono::TimeZone>(datetime: &chrono::DateTime<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T::Offset: std::fmt::Display,
{
    serializer.serialize_str(&datetime.to_rfc3339())
}
