//! Core types for Vak-SMS operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

// =============================================================================
// NumberId
// =============================================================================

/// Identifier of a leased number (`idNum` on the wire).
///
/// Every number-bearing operation accepts `impl Into<NumberId>`, so callers
/// can pass either the raw identifier or the [`LeasedNumber`] itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberId(String);

impl NumberId {
    /// Create a new NumberId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NumberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NumberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for NumberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NumberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<&NumberId> for NumberId {
    fn from(id: &NumberId) -> Self {
        id.clone()
    }
}

impl From<LeasedNumber> for NumberId {
    fn from(number: LeasedNumber) -> Self {
        number.id
    }
}

impl From<&LeasedNumber> for NumberId {
    fn from(number: &LeasedNumber) -> Self {
        number.id.clone()
    }
}

// =============================================================================
// Tel
// =============================================================================

/// Phone number digits including the country code (e.g. "79991112233").
///
/// The provider sends this either as a JSON string or a JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tel(String);

impl Tel {
    /// Create a new Tel.
    pub fn new(tel: impl Into<String>) -> Self {
        Self(tel.into())
    }

    /// Get the number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number with a leading '+'.
    pub fn with_plus_prefix(&self) -> String {
        format!("+{}", self.0)
    }
}

impl Display for Tel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Tel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Tel {
    fn from(tel: String) -> Self {
        Self(tel)
    }
}

impl From<&str> for Tel {
    fn from(tel: &str) -> Self {
        Self(tel.to_string())
    }
}

impl From<u64> for Tel {
    fn from(tel: u64) -> Self {
        Self(tel.to_string())
    }
}

impl Serialize for Tel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Tel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(de::Error::custom(format!(
                "expected phone number as string or integer, got {other}"
            ))),
        }
    }
}

// =============================================================================
// SmsCode
// =============================================================================

/// SMS verification code received on a leased number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsCode(pub String);

impl SmsCode {
    /// Create a new SmsCode.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SmsCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SmsCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SmsCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<&str> for SmsCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

// =============================================================================
// SmsCodeField
// =============================================================================

/// The `smsCode` field of a getSmsCode response.
///
/// On the wire this is `null`, a single code, or a list of codes ordered
/// oldest first. Empty strings are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsCodeField {
    codes: Vec<SmsCode>,
}

impl SmsCodeField {
    /// Build from a list of codes, oldest first.
    pub fn new(codes: impl IntoIterator<Item = SmsCode>) -> Self {
        Self {
            codes: codes
                .into_iter()
                .filter(|code| !code.as_str().is_empty())
                .collect(),
        }
    }

    /// The most recent code, if any arrived.
    pub fn latest(&self) -> Option<&SmsCode> {
        self.codes.last()
    }

    /// All received codes, oldest first.
    pub fn all(&self) -> &[SmsCode] {
        &self.codes
    }

    /// True if no code has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn into_latest(mut self) -> Option<SmsCode> {
        self.codes.pop()
    }
}

fn code_from_value(value: Value) -> Option<SmsCode> {
    match value {
        Value::String(s) => Some(SmsCode(s)),
        Value::Number(n) => Some(SmsCode(n.to_string())),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for SmsCodeField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let codes = match Value::deserialize(deserializer)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().filter_map(code_from_value).collect(),
            Value::Object(_) | Value::Bool(_) => {
                return Err(de::Error::custom("expected SMS code, list of codes or null"));
            }
            single => code_from_value(single).into_iter().collect(),
        };
        Ok(Self::new(codes))
    }
}

/// Response of the getSmsCode endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GetSmsCodeResponse {
    #[serde(rename = "smsCode", default)]
    pub sms_code: SmsCodeField,
}

// =============================================================================
// LeasedNumber
// =============================================================================

/// A phone number leased from the provider.
///
/// The provider is the source of truth for its status; this value is a
/// snapshot taken when the number was bought or prolonged and keeps existing
/// after the number was released with `end` or `bad`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeasedNumber {
    /// Number identifier used by every follow-up operation.
    #[serde(rename = "idNum")]
    pub id: NumberId,
    /// Phone number digits.
    pub tel: Tel,
    /// Service code(s) the number was leased for, comma-joined.
    #[serde(default)]
    pub service: String,
    /// Whether the number was leased in rent mode.
    #[serde(default)]
    pub rent: bool,
}

impl LeasedNumber {
    /// Service codes this number was leased for.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.service.split(',').filter(|s| !s.is_empty())
    }
}

/// Result of buying a number.
///
/// The provider answers with a bare list when one number is bought for
/// several services at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberPurchase {
    /// One number for one (or a combined) service.
    Single(LeasedNumber),
    /// One entry per purchased service.
    Multiple(Vec<LeasedNumber>),
}

impl NumberPurchase {
    /// All leased numbers in this purchase.
    pub fn numbers(&self) -> &[LeasedNumber] {
        match self {
            Self::Single(number) => std::slice::from_ref(number),
            Self::Multiple(numbers) => numbers,
        }
    }

    pub fn into_numbers(self) -> Vec<LeasedNumber> {
        match self {
            Self::Single(number) => vec![number],
            Self::Multiple(numbers) => numbers,
        }
    }

    /// The single number, if this is not a multi-service purchase.
    pub fn single(&self) -> Option<&LeasedNumber> {
        match self {
            Self::Single(number) => Some(number),
            Self::Multiple(_) => None,
        }
    }
}

// =============================================================================
// NumberRequest
// =============================================================================

/// Default country code for purchases and counts.
pub const DEFAULT_COUNTRY: &str = "ru";

/// Parameters for buying a number.
///
/// # Example
///
/// ```rust
/// use vak_sms::NumberRequest;
///
/// let request = NumberRequest::for_services(["viber", "whatsapp"])
///     .operator("mts")
///     .rent(true);
///
/// assert_eq!(request.service_param(), "viber,whatsapp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberRequest {
    services: Vec<String>,
    operator: Option<String>,
    rent: bool,
    country: String,
}

impl NumberRequest {
    /// Request a number for a single service.
    pub fn new(service: impl Into<String>) -> Self {
        Self::for_services([service.into()])
    }

    /// Request one number usable for several services.
    pub fn for_services<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            services: services.into_iter().map(Into::into).collect(),
            operator: None,
            rent: false,
            country: DEFAULT_COUNTRY.to_string(),
        }
    }

    /// Restrict to a mobile operator.
    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Lease in rent mode.
    pub fn rent(mut self, rent: bool) -> Self {
        self.rent = rent;
        self
    }

    /// Country code (default: "ru").
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// The `service` query value: services joined with ','.
    pub fn service_param(&self) -> String {
        self.services.join(",")
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn operator_code(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn is_rent(&self) -> bool {
        self.rent
    }

    pub fn country_code(&self) -> &str {
        &self.country
    }
}

// =============================================================================
// Status transitions
// =============================================================================

/// Status transitions a caller can request for a leased number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberStatus {
    /// Ask for (another) SMS to be delivered.
    Send,
    /// Release the number back to the pool. It may be issued again, to anyone.
    End,
    /// Blacklist the number. It is never issued again.
    Bad,
}

impl NumberStatus {
    /// Wire value of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::End => "end",
            Self::Bad => "bad",
        }
    }
}

impl Display for NumberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider answer to a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetStatusResponse {
    /// Number is ready for a new SMS.
    Ready,
    /// An SMS was already received.
    SmsReceived,
    /// Still waiting for the SMS.
    WaitSms,
    /// Number was updated.
    Update,
    /// Any value this client does not know.
    Other(String),
}

impl SetStatusResponse {
    /// Parse from the raw `status` value.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim() {
            "ready" => Self::Ready,
            "smsReceived" => Self::SmsReceived,
            "waitSMS" => Self::WaitSms,
            "update" => Self::Update,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for SetStatusResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::SmsReceived => write!(f, "smsReceived"),
            Self::WaitSms => write!(f, "waitSMS"),
            Self::Update => write!(f, "update"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl<'de> Deserialize<'de> for SetStatusResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_raw(&s))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SetStatusBody {
    pub status: SetStatusResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BalanceBody {
    pub balance: f64,
}

// =============================================================================
// Lookups
// =============================================================================

/// Number of available numbers for a service, with its price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountNumber {
    /// Service code.
    pub service: String,
    /// Numbers available.
    pub count: u64,
    /// Price per number, when the provider sent it.
    pub price: Option<f64>,
}

impl CountNumber {
    /// Build from a getCountNumber body such as `{"tg": 2000, "price": 20.0}`.
    ///
    /// The count is read from the key matching `service`; failing that, from
    /// the first key that is not `price`.
    pub(crate) fn from_body(service: &str, body: &Map<String, Value>) -> Option<Self> {
        let (key, count) = body
            .get_key_value(service)
            .or_else(|| body.iter().find(|(k, _)| k.as_str() != "price"))?;

        let count = match count {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };

        let price = body.get("price").and_then(|p| match p {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Some(Self {
            service: key.clone(),
            count,
            price,
        })
    }
}

/// A country with the operators the provider supports there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryOperators {
    /// Human-readable country name.
    pub country_name: String,
    /// Provider country code (e.g. "ru").
    pub country_code: String,
    /// Operator codes.
    #[serde(default)]
    pub operator_list: Vec<String>,
}

/// Service entry from the bulk service listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Full service name.
    #[serde(default)]
    pub name: String,
    /// Icon URL, absolute once returned by the client.
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub count: Option<u64>,
    /// Fields this client does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_id_from_leased_number() {
        let number = LeasedNumber {
            id: NumberId::new("abc"),
            tel: Tel::from(79991112233u64),
            service: "tg".to_string(),
            rent: false,
        };
        assert_eq!(NumberId::from(&number).as_str(), "abc");
        assert_eq!(NumberId::from("abc"), NumberId::from(number));
    }

    #[test]
    fn test_tel_accepts_string_and_integer() {
        let tel: Tel = serde_json::from_value(json!(79991112233u64)).unwrap();
        assert_eq!(tel.as_str(), "79991112233");

        let tel: Tel = serde_json::from_value(json!("79991112233")).unwrap();
        assert_eq!(tel.with_plus_prefix(), "+79991112233");

        assert!(serde_json::from_value::<Tel>(json!(true)).is_err());
    }

    #[test]
    fn test_sms_code_field_shapes() {
        let field: GetSmsCodeResponse = serde_json::from_value(json!({"smsCode": null})).unwrap();
        assert!(field.sms_code.is_empty());

        let field: GetSmsCodeResponse = serde_json::from_value(json!({})).unwrap();
        assert!(field.sms_code.latest().is_none());

        let field: GetSmsCodeResponse =
            serde_json::from_value(json!({"smsCode": "1234"})).unwrap();
        assert_eq!(field.sms_code.latest(), Some(&SmsCode::new("1234")));

        let field: GetSmsCodeResponse =
            serde_json::from_value(json!({"smsCode": ["1111", "2222", "3333"]})).unwrap();
        assert_eq!(field.sms_code.all().len(), 3);
        assert_eq!(field.sms_code.into_latest(), Some(SmsCode::new("3333")));

        let field: GetSmsCodeResponse = serde_json::from_value(json!({"smsCode": []})).unwrap();
        assert!(field.sms_code.is_empty());

        let field: GetSmsCodeResponse = serde_json::from_value(json!({"smsCode": ""})).unwrap();
        assert!(field.sms_code.is_empty());
    }

    #[test]
    fn test_leased_number_deserialization() {
        let number: LeasedNumber = serde_json::from_value(json!({
            "tel": 79991112233u64,
            "service": "vk",
            "idNum": "3adb61376b8f4adb90d6e758cf8c5db8"
        }))
        .unwrap();
        assert_eq!(number.id.as_str(), "3adb61376b8f4adb90d6e758cf8c5db8");
        assert_eq!(number.tel.as_str(), "79991112233");
        assert_eq!(number.service, "vk");
        assert!(!number.rent);
    }

    #[test]
    fn test_leased_number_services() {
        let number = LeasedNumber {
            id: NumberId::new("1"),
            tel: Tel::new("7999"),
            service: "viber,whatsapp".to_string(),
            rent: false,
        };
        assert_eq!(number.services().collect::<Vec<_>>(), ["viber", "whatsapp"]);
    }

    #[test]
    fn test_number_request_joins_services() {
        let request = NumberRequest::for_services(["viber", "whatsapp"]);
        assert_eq!(request.service_param(), "viber,whatsapp");
        assert_eq!(request.country_code(), "ru");
        assert!(!request.is_rent());

        let request = NumberRequest::new("tg").country("ua").rent(true);
        assert_eq!(request.service_param(), "tg");
        assert_eq!(request.country_code(), "ua");
        assert!(request.is_rent());
    }

    #[test]
    fn test_number_status_wire_values() {
        assert_eq!(NumberStatus::Send.as_str(), "send");
        assert_eq!(NumberStatus::End.as_str(), "end");
        assert_eq!(NumberStatus::Bad.to_string(), "bad");
    }

    #[test]
    fn test_set_status_response_from_raw() {
        assert_eq!(SetStatusResponse::from_raw("ready"), SetStatusResponse::Ready);
        assert_eq!(
            SetStatusResponse::from_raw("waitSMS"),
            SetStatusResponse::WaitSms
        );
        assert_eq!(
            SetStatusResponse::from_raw("somethingNew"),
            SetStatusResponse::Other("somethingNew".to_string())
        );
    }

    #[test]
    fn test_count_number_from_body() {
        let body = json!({"tg": 2000, "price": 20.5});
        let count = CountNumber::from_body("tg", body.as_object().unwrap()).unwrap();
        assert_eq!(count.service, "tg");
        assert_eq!(count.count, 2000);
        assert_eq!(count.price, Some(20.5));

        // Provider may answer under a different key than requested.
        let body = json!({"price": 5, "vk": "17"});
        let count = CountNumber::from_body("vkontakte", body.as_object().unwrap()).unwrap();
        assert_eq!(count.service, "vk");
        assert_eq!(count.count, 17);

        let body = json!({"price": 5});
        assert!(CountNumber::from_body("tg", body.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_service_info_keeps_unknown_fields() {
        let info: ServiceInfo = serde_json::from_value(json!({
            "name": "Telegram",
            "icon": "/static/service/tg.png",
            "price": 20.0,
            "count": 150,
            "info": "any"
        }))
        .unwrap();
        assert_eq!(info.name, "Telegram");
        assert_eq!(info.count, Some(150));
        assert_eq!(info.extra.get("info"), Some(&json!("any")));
    }
}
