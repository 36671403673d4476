use async_trait::async_trait;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{Datapoint, Dimension, Statistic};
use aws_sdk_servicequotas::types::ServiceQuota;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::checker::{LimitChecker, LimitResult, LimitUsage, LimitsByService};
use crate::error::CheckError;
use crate::types::{LimitOverrides, ThresholdOverrides};

/// CloudWatch metric that reports the usage of a quota.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageMetric {
    pub namespace: String,
    pub name: String,
    /// Sorted by dimension name.
    pub dimensions: Vec<(String, String)>,
    pub statistic: String,
}

impl UsageMetric {
    pub fn describe(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaInfo {
    pub name: String,
    pub code: Option<String>,
    pub value: Option<f64>,
    pub usage_metric: Option<UsageMetric>,
}

/// Where quota values and their usage come from.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    async fn list_quotas(&self, service_code: &str) -> Result<Vec<QuotaInfo>, CheckError>;
    async fn current_usage(&self, metric: &UsageMetric) -> Result<Option<f64>, CheckError>;
}

/// Longest usage window one `GetMetricStatistics` call can cover at a
/// 60 second period (CloudWatch returns at most 1440 datapoints).
pub const MAX_LOOKBACK_MINUTES: i64 = 1440;

/// Service Quotas for limits, CloudWatch for usage.
pub struct AwsQuotaSource {
    quotas: aws_sdk_servicequotas::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    lookback_minutes: i64,
}

impl AwsQuotaSource {
    pub fn new(
        quotas: aws_sdk_servicequotas::Client,
        cloudwatch: aws_sdk_cloudwatch::Client,
        lookback_minutes: i64,
    ) -> Self {
        Self {
            quotas,
            cloudwatch,
            lookback_minutes,
        }
    }

    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig, lookback_minutes: i64) -> Self {
        Self::new(
            aws_sdk_servicequotas::Client::new(sdk_config),
            aws_sdk_cloudwatch::Client::new(sdk_config),
            lookback_minutes,
        )
    }

    async fn applied_quotas(&self, service_code: &str) -> Result<Vec<QuotaInfo>, CheckError> {
        let mut quotas = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let resp = self
                .quotas
                .list_service_quotas()
                .service_code(service_code)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| quota_error(service_code, e))?;
            quotas.extend(resp.quotas().iter().filter_map(quota_info));
            match resp.next_token() {
                Some(t) if !t.is_empty() => next_token = Some(t.to_string()),
                _ => break,
            }
        }
        Ok(quotas)
    }

    async fn default_quotas(&self, service_code: &str) -> Result<Vec<QuotaInfo>, CheckError> {
        let mut quotas = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let resp = self
                .quotas
                .list_aws_default_service_quotas()
                .service_code(service_code)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| quota_error(service_code, e))?;
            quotas.extend(resp.quotas().iter().filter_map(quota_info));
            match resp.next_token() {
                Some(t) if !t.is_empty() => next_token = Some(t.to_string()),
                _ => break,
            }
        }
        Ok(quotas)
    }
}

#[async_trait]
impl QuotaSource for AwsQuotaSource {
    async fn list_quotas(&self, service_code: &str) -> Result<Vec<QuotaInfo>, CheckError> {
        // ListServiceQuotas only returns quotas with an applied value
        let defaults = self.default_quotas(service_code).await?;
        let applied = self.applied_quotas(service_code).await?;
        debug!(
            service = %service_code,
            defaults = defaults.len(),
            applied = applied.len(),
            "merging quota lists"
        );
        Ok(merge_applied(defaults, applied))
    }

    async fn current_usage(&self, metric: &UsageMetric) -> Result<Option<f64>, CheckError> {
        let end = Utc::now();
        let start = Some(self.lookback_minutes)
            .filter(|m| (1..=MAX_LOOKBACK_MINUTES).contains(m))
            .and_then(Duration::try_minutes)
            .and_then(|window| end.checked_sub_signed(window))
            .ok_or_else(|| CheckError::Usage {
                metric: metric.describe(),
                message: format!(
                    "lookback of {} minutes is outside 1..={}",
                    self.lookback_minutes, MAX_LOOKBACK_MINUTES
                ),
            })?;
        let dimensions = metric
            .dimensions
            .iter()
            .map(|(k, v)| Dimension::builder().name(k).value(v).build())
            .collect::<Vec<Dimension>>();
        let statistic = Statistic::from(metric.statistic.as_str());

        let resp = self
            .cloudwatch
            .get_metric_statistics()
            .namespace(&metric.namespace)
            .metric_name(&metric.name)
            .set_dimensions(Some(dimensions))
            .start_time(AwsDateTime::from_secs(start.timestamp()))
            .end_time(AwsDateTime::from_secs(end.timestamp()))
            .period(60)
            .statistics(statistic.clone())
            .send()
            .await
            .map_err(|e| CheckError::Usage {
                metric: metric.describe(),
                message: aws_sdk_cloudwatch::error::DisplayErrorContext(&e).to_string(),
            })?;

        Ok(resp
            .datapoints()
            .iter()
            .filter_map(|dp| datapoint_value(dp, &statistic))
            .reduce(f64::max))
    }
}

fn quota_error<E>(service_code: &str, err: E) -> CheckError
where
    E: std::error::Error,
{
    CheckError::Quotas {
        service: service_code.to_string(),
        message: aws_sdk_servicequotas::error::DisplayErrorContext(&err).to_string(),
    }
}

/// Defaults in their listed order, with applied values replacing them by quota
/// code (or name when AWS omits the code). Applied quotas with no default
/// entry are appended.
pub fn merge_applied(defaults: Vec<QuotaInfo>, applied: Vec<QuotaInfo>) -> Vec<QuotaInfo> {
    fn key(q: &QuotaInfo) -> &str {
        q.code.as_deref().unwrap_or(&q.name)
    }
    let mut applied: HashMap<String, QuotaInfo> = applied
        .into_iter()
        .map(|q| (key(&q).to_string(), q))
        .collect();
    let mut merged: Vec<QuotaInfo> = defaults
        .into_iter()
        .map(|default| applied.remove(key(&default)).unwrap_or(default))
        .collect();
    let mut extra: Vec<QuotaInfo> = applied.into_values().collect();
    extra.sort_by(|a, b| a.name.cmp(&b.name));
    merged.extend(extra);
    merged
}

fn quota_info(quota: &ServiceQuota) -> Option<QuotaInfo> {
    let name = quota.quota_name()?.to_string();
    let usage_metric = quota.usage_metric().and_then(|m| {
        let mut dimensions: Vec<(String, String)> = m
            .metric_dimensions()
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        dimensions.sort();
        Some(UsageMetric {
            namespace: m.metric_namespace()?.to_string(),
            name: m.metric_name()?.to_string(),
            dimensions,
            statistic: m
                .metric_statistic_recommendation()
                .unwrap_or("Maximum")
                .to_string(),
        })
    });
    Some(QuotaInfo {
        name,
        code: quota.quota_code().map(str::to_string),
        value: quota.value(),
        usage_metric,
    })
}

fn datapoint_value(dp: &Datapoint, statistic: &Statistic) -> Option<f64> {
    match statistic {
        Statistic::Average => dp.average(),
        Statistic::Minimum => dp.minimum(),
        Statistic::SampleCount => dp.sample_count(),
        Statistic::Sum => dp.sum(),
        Statistic::Maximum => dp.maximum(),
        other => {
            debug!(statistic = %other.as_str(), "unsupported statistic, reading Maximum");
            dp.maximum()
        }
    }
}

/// `LimitChecker` over a `QuotaSource`, keyed by service code then quota name.
pub struct ServiceQuotasChecker<S> {
    source: S,
    services: Vec<String>,
    warning_threshold: f64,
    critical_threshold: f64,
    limit_overrides: LimitOverrides,
    threshold_overrides: ThresholdOverrides,
    limits: LimitsByService,
}

impl<S: QuotaSource> ServiceQuotasChecker<S> {
    pub fn new(source: S, services: Vec<String>, warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            source,
            services,
            warning_threshold,
            critical_threshold,
            limit_overrides: LimitOverrides::new(),
            threshold_overrides: ThresholdOverrides::new(),
            limits: LimitsByService::new(),
        }
    }

    async fn check_service(&self, service: &str) -> Result<HashMap<String, LimitResult>, CheckError> {
        let quotas = self.source.list_quotas(service).await?;
        debug!(service = %service, quotas = quotas.len(), "checking service quotas");
        let limit_overrides = self.limit_overrides.get(service);
        let threshold_overrides = self.threshold_overrides.get(service);

        let mut results = HashMap::new();
        for quota in quotas {
            let limit = limit_overrides
                .and_then(|o| o.get(&quota.name))
                .copied()
                .or(quota.value);
            let mut result = LimitResult::new(limit);
            if let Some(metric) = &quota.usage_metric {
                if let Some(value) = self.source.current_usage(metric).await? {
                    result.add_usage(LimitUsage::new(value));
                }
            }
            let over = threshold_overrides.and_then(|o| o.get(&quota.name));
            let ok = result.evaluate(self.warning_threshold, self.critical_threshold, over);
            debug!(service = %service, quota = %quota.name, ok, usage = %result.current_usage_str(), "evaluated quota");
            results.insert(quota.name, result);
        }
        Ok(results)
    }
}

#[async_trait]
impl<S: QuotaSource> LimitChecker for ServiceQuotasChecker<S> {
    fn set_limit_overrides(&mut self, overrides: &LimitOverrides) {
        self.limit_overrides = overrides.clone();
    }

    fn set_threshold_overrides(&mut self, overrides: &ThresholdOverrides) {
        self.threshold_overrides = overrides.clone();
    }

    fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    fn critical_threshold(&self) -> f64 {
        self.critical_threshold
    }

    async fn check_thresholds(&mut self) -> Result<(), CheckError> {
        let mut limits = LimitsByService::new();
        for service in &self.services {
            let results = self.check_service(service).await?;
            limits.insert(service.clone(), results);
        }
        for (service, name) in unmatched_overrides(&self.limit_overrides, &limits) {
            warn!(service = %service, limit = %name, "ignoring limit override for unknown limit");
        }
        for (service, name) in unmatched_overrides(&self.threshold_overrides, &limits) {
            warn!(service = %service, limit = %name, "ignoring threshold override for unknown limit");
        }
        self.limits = limits;
        Ok(())
    }

    fn get_limits(&self) -> Result<LimitsByService, CheckError> {
        Ok(self.limits.clone())
    }
}

/// Override keys that name no checked (service, limit) pair, sorted.
pub fn unmatched_overrides<V>(
    overrides: &HashMap<String, HashMap<String, V>>,
    limits: &LimitsByService,
) -> Vec<(String, String)> {
    let mut unmatched: Vec<(String, String)> = overrides
        .iter()
        .flat_map(|(service, names)| names.keys().map(move |n| (service, n)))
        .filter(|(service, name)| {
            !limits
                .get(*service)
                .is_some_and(|svc| svc.contains_key(*name))
        })
        .map(|(s, n)| (s.clone(), n.clone()))
        .collect();
    unmatched.sort();
    unmatched
}
