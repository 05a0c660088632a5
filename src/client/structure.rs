//! Vak-SMS client implementation.

use super::builder::VakSmsBuilder;
use crate::cache::{CacheKey, ResponseCache};
use crate::errors::Result;
use crate::polling::{CodeSource, SmsCodePoller, WaitConfig, WaitReport};
use crate::response::{decode, unexpected};
use crate::transport::{ApiRequest, Dispatched, Transport};
use crate::types::{
    BalanceBody, CountNumber, CountryOperators, GetSmsCodeResponse, LeasedNumber, NumberId,
    NumberPurchase, NumberRequest, NumberStatus, ServiceInfo, SetStatusBody, SetStatusResponse,
    SmsCode, SmsCodeField, Tel,
};
use crate::utils::clock::SharedClock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use url::Url;

#[cfg(feature = "tracing")]
use opentelemetry::trace::Status;
#[cfg(feature = "tracing")]
use tracing::Span;
#[cfg(feature = "tracing")]
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Default country code for the bulk service listing.
pub const DEFAULT_LIST_COUNTRY: &str = "RU";

/// Vak-SMS API client.
///
/// The first request probes the mirror domains in order and pins the first
/// one that answers; every later request goes there. Country, count and
/// service lookups are cached. Clones share the pinned mirror and the cache.
///
/// # Example
///
/// ```rust,ignore
/// use vak_sms::{NumberRequest, NumberStatus, VakSms, WaitConfig};
///
/// let client = VakSms::with_api_key("your_api_key")?;
///
/// let purchase = client.get_number(&NumberRequest::new("tg")).await?;
/// let number = purchase.single().expect("single service");
///
/// match client.wait_sms_code(number, &WaitConfig::default()).await? {
///     Some(code) => println!("Got code: {code}"),
///     None => {
///         client.set_status(number, NumberStatus::End).await?;
///     }
/// }
/// ```
#[derive(Clone)]
pub struct VakSms {
    transport: Transport,
    cache: ResponseCache,
    clock: SharedClock,
    soft_id: Option<String>,
}

impl std::fmt::Debug for VakSms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VakSms")
            .field("base_url", &self.transport.base_url())
            .field("api_key", &self.has_api_key().then_some("[REDACTED]"))
            .field("cache", &self.cache)
            .finish()
    }
}

impl VakSms {
    pub(crate) fn from_parts(
        transport: Transport,
        cache: ResponseCache,
        clock: SharedClock,
        soft_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            cache,
            clock,
            soft_id,
        }
    }

    /// Create a client with the default mirrors and settings.
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for configuring the client.
    pub fn builder() -> VakSmsBuilder {
        VakSmsBuilder::new()
    }

    /// Base address requests go to: the explicit one, or the pinned mirror
    /// once discovery has run.
    pub fn pinned_base_url(&self) -> Option<Url> {
        self.transport.base_url()
    }

    pub fn has_api_key(&self) -> bool {
        self.transport.has_api_key()
    }

    /// The response cache used by this client.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    async fn send(&self, request: ApiRequest) -> Result<Dispatched> {
        self.transport.send(&request).await
    }

    /// Get the account balance.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "VakSms::get_balance", skip_all)
    )]
    pub async fn get_balance(&self) -> Result<f64> {
        let request = ApiRequest::new("getBalance", "/api/getBalance");
        let body: BalanceBody = decode("getBalance", self.send(request).await?.body)?;

        #[cfg(feature = "tracing")]
        Span::current().set_status(Status::Ok);

        Ok(body.balance)
    }

    /// Get how many numbers are available for a service, and their price.
    ///
    /// # Arguments
    /// * `service` - Service code (e.g. "tg")
    /// * `operator` - Optional operator code
    /// * `country` - Country code, usually [`DEFAULT_COUNTRY`](crate::types::DEFAULT_COUNTRY)
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "VakSms::get_count_number",
            skip_all,
            fields(service = %service, country = %country)
        )
    )]
    pub async fn get_count_number(
        &self,
        service: &str,
        operator: Option<&str>,
        country: &str,
    ) -> Result<CountNumber> {
        const OPERATION: &str = "getCountNumber";

        let key = CacheKey::new(OPERATION)
            .arg(service)
            .opt_arg(operator)
            .arg(country);

        self.cache
            .get_or_fetch(key, || async move {
                let request = ApiRequest::new(OPERATION, "/api/getCountNumber")
                    .param("service", service)
                    .opt_param("operator", operator)
                    .param("country", country)
                    .param("price", "1");

                let body = self.send(request).await?.body;
                let Value::Object(map) = body else {
                    return Err(unexpected(OPERATION, "expected a JSON object"));
                };
                CountNumber::from_body(service, &map)
                    .ok_or_else(|| unexpected(OPERATION, "no service count in response"))
            })
            .await
    }

    /// Get the countries and their operators. Needs no API key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "VakSms::get_country_list", skip_all)
    )]
    pub async fn get_country_list(&self) -> Result<Vec<CountryOperators>> {
        const OPERATION: &str = "getCountryList";

        self.cache
            .get_or_fetch(CacheKey::new(OPERATION), || async {
                let request = ApiRequest::new(OPERATION, "/api/getCountryList").public();
                decode(OPERATION, self.send(request).await?.body)
            })
            .await
    }

    /// Buy a number.
    ///
    /// A request for several services answers with one entry per service.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "VakSms::get_number",
            skip_all,
            fields(
                service = %request.service_param(),
                country = %request.country_code(),
                rent = request.is_rent()
            )
        )
    )]
    pub async fn get_number(&self, request: &NumberRequest) -> Result<NumberPurchase> {
        const OPERATION: &str = "getNumber";

        let api_request = ApiRequest::new(OPERATION, "/api/getNumber/")
            .param("service", request.service_param())
            .opt_param("operator", request.operator_code())
            .param("rent", if request.is_rent() { "true" } else { "false" })
            .param("country", request.country_code())
            .opt_param("softId", self.soft_id.as_deref());

        let purchase = match self.send(api_request).await?.body {
            Value::Array(items) => {
                let mut numbers: Vec<LeasedNumber> = decode(OPERATION, Value::Array(items))?;
                for number in &mut numbers {
                    number.rent = request.is_rent();
                }
                NumberPurchase::Multiple(numbers)
            }
            Value::Object(mut map) => {
                map.insert("service".into(), Value::String(request.service_param()));
                map.insert("rent".into(), Value::Bool(request.is_rent()));
                NumberPurchase::Single(decode(OPERATION, Value::Object(map))?)
            }
            _ => return Err(unexpected(OPERATION, "expected a number or a list of numbers")),
        };

        #[cfg(feature = "tracing")]
        Span::current().set_status(Status::Ok);

        Ok(purchase)
    }

    /// Extend the lease of a number.
    ///
    /// `rent` tells whether the lease being extended is a rent lease; the
    /// provider does not echo it back.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "VakSms::prolong_number",
            skip_all,
            fields(service = %service, rent = rent)
        )
    )]
    pub async fn prolong_number(
        &self,
        service: &str,
        tel: impl Into<Tel>,
        rent: bool,
    ) -> Result<LeasedNumber> {
        const OPERATION: &str = "prolongNumber";

        let tel = tel.into();
        let request = ApiRequest::new(OPERATION, "/api/prolongNumber")
            .param("service", service)
            .param("tel", tel.as_str())
            .opt_param("softId", self.soft_id.as_deref());

        let Value::Object(mut map) = self.send(request).await?.body else {
            return Err(unexpected(OPERATION, "expected a JSON object"));
        };
        map.insert("service".into(), Value::String(service.to_string()));
        map.insert("rent".into(), Value::Bool(rent));
        map.entry("tel")
            .or_insert_with(|| Value::String(tel.as_str().to_string()));

        let number = decode(OPERATION, Value::Object(map))?;

        #[cfg(feature = "tracing")]
        Span::current().set_status(Status::Ok);

        Ok(number)
    }

    /// Request a status transition for a number.
    ///
    /// No local check is made that the transition is legal; the provider
    /// decides.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "VakSms::set_status",
            skip_all,
            fields(
                status = %status,
                number = tracing::field::Empty,
                response = tracing::field::Empty
            )
        )
    )]
    pub async fn set_status(
        &self,
        number: impl Into<NumberId>,
        status: NumberStatus,
    ) -> Result<SetStatusResponse> {
        let number = number.into();
        let request = ApiRequest::new("setStatus", "/api/setStatus")
            .param("idNum", number.as_str())
            .param("status", status.as_str());

        let body: SetStatusBody = decode("setStatus", self.send(request).await?.body)?;

        #[cfg(feature = "tracing")]
        {
            Span::current()
                .record("number", number.as_str())
                .record("response", body.status.to_string())
                .set_status(Status::Ok);
        }

        Ok(body.status)
    }

    /// Get the codes received by a number so far.
    ///
    /// With `all` set the provider returns every code received during the
    /// lease, not just the latest.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "VakSms::get_sms_code", skip_all, fields(all = all))
    )]
    pub async fn get_sms_code(&self, number: impl Into<NumberId>, all: bool) -> Result<SmsCodeField> {
        let number = number.into();
        let request = ApiRequest::new("getSmsCode", "/api/getSmsCode/")
            .param("idNum", number.as_str())
            .opt_param("all", all.then_some("true"));

        let body: GetSmsCodeResponse = decode("getSmsCode", self.send(request).await?.body)?;

        #[cfg(feature = "tracing")]
        Span::current().set_status(Status::Ok);

        Ok(body.sms_code)
    }

    /// Request an SMS and wait for its code.
    ///
    /// Returns `None` when the timeout elapses without a code.
    pub async fn wait_sms_code(
        &self,
        number: impl Into<NumberId>,
        config: &WaitConfig,
    ) -> Result<Option<SmsCode>> {
        self.wait_sms_code_cancellable(number, config, CancellationToken::new())
            .await
    }

    /// Like [`wait_sms_code`](Self::wait_sms_code), but stops with
    /// [`VakSmsError::Cancelled`](crate::VakSmsError::Cancelled) once
    /// `cancel` fires.
    pub async fn wait_sms_code_cancellable(
        &self,
        number: impl Into<NumberId>,
        config: &WaitConfig,
        cancel: CancellationToken,
    ) -> Result<Option<SmsCode>> {
        let number = number.into();
        SmsCodePoller::new(self.clone(), config.clone())
            .with_clock(self.clock.clone())
            .run_cancellable(&number, cancel)
            .await
            .map(WaitReport::into_code)
    }

    /// Get every service with its name, icon, price and count. Needs no API
    /// key.
    ///
    /// Icons are returned as absolute URLs.
    ///
    /// # Arguments
    /// * `country` - Country code, usually [`DEFAULT_LIST_COUNTRY`]
    /// * `operator` - Optional operator code
    /// * `rent` - List rent prices instead of one-off ones
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "VakSms::get_count_number_list",
            skip_all,
            fields(country = %country, rent = rent)
        )
    )]
    pub async fn get_count_number_list(
        &self,
        country: &str,
        operator: Option<&str>,
        rent: bool,
    ) -> Result<BTreeMap<String, ServiceInfo>> {
        const OPERATION: &str = "getCountNumbersList";

        let key = CacheKey::new(OPERATION)
            .arg(country)
            .opt_arg(operator)
            .arg(rent);

        self.cache
            .get_or_fetch(key, || async move {
                let request = ApiRequest::new(OPERATION, "/api/getCountNumbersList")
                    .public()
                    .param("country", country)
                    .opt_param("operator", operator)
                    .param("rent", if rent { "True" } else { "False" });

                let Dispatched { base_url, body } = self.send(request).await?;
                let listing: Map<String, Value> = decode(OPERATION, body)?;

                let mut services = BTreeMap::new();
                for (code, entries) in listing {
                    let Some(first) = first_entry(entries) else {
                        continue;
                    };
                    let mut info: ServiceInfo = decode(OPERATION, first)?;
                    info.icon = absolute_icon(&base_url, &info.icon);
                    services.insert(code, info);
                }
                Ok(services)
            })
            .await
    }
}

fn first_entry(entries: Value) -> Option<Value> {
    match entries {
        Value::Array(items) => items.into_iter().next(),
        Value::Object(map) => Some(Value::Object(map)),
        _ => None,
    }
}

/// Resolve a relative icon path against the base address that served it.
///
/// Root-relative paths are appended below the base path, so a base such as
/// `https://proxy.example/vak/` keeps its prefix.
fn absolute_icon(base: &Url, icon: &str) -> String {
    if icon.is_empty() || Url::parse(icon).is_ok() {
        return icon.to_string();
    }
    base.join(icon.trim_start_matches('/'))
        .map(String::from)
        .unwrap_or_else(|_| icon.to_string())
}

impl CodeSource for VakSms {
    async fn request_delivery(&self, number: &NumberId) -> Result<()> {
        self.set_status(number, NumberStatus::Send).await.map(|_| ())
    }

    async fn check_code(&self, number: &NumberId) -> Result<SmsCodeField> {
        self.get_sms_code(number, false).await
    }
}
