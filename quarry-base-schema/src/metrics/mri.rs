use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::metrics::{MetricUnit, try_normalize_metric_name};

/// The type of a metric, determining its aggregation and storage.
///
/// The metric store keeps a separate storage per type, so the type of a metric
/// decides which storage a query against it must address.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MetricType {
    /// Counts instances of an event, aggregating by addition.
    ///
    /// Counters are declared as `"c"`. Alternatively, `"m"` is allowed.
    Counter,
    /// Builds a statistical distribution over values reported.
    ///
    /// Distributions are declared as `"d"`. Alternatively, `"h"` and `"ms"`
    /// are allowed.
    Distribution,
    /// Counts the number of unique reported values.
    ///
    /// Sets are declared as `"s"`.
    Set,
}

impl MetricType {
    /// Return the shortcode for this metric type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Distribution => "d",
            MetricType::Set => "s",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "c" | "m" => Self::Counter,
            "h" | "d" | "ms" => Self::Distribution,
            "s" => Self::Set,
            _ => return Err(ParseMetricError),
        })
    }
}

crate::impl_str_serde!(MetricType, "a metric type string");

/// An error returned when metric names or MRIs cannot be parsed.
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("failed to parse metric")]
pub struct ParseMetricError;

/// The namespace of a metric.
///
/// Namespaces allow to identify the product entity that the metric got
/// extracted from, and identify the use case that the metric belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MetricNamespace {
    /// Metrics extracted from sessions.
    Sessions,
    /// Metrics extracted from transaction events.
    Transactions,
    /// User-defined metrics directly sent by SDKs and applications.
    Custom,
    /// An unknown and unsupported metric.
    ///
    /// Metrics that Quarry either doesn't know or recognize the namespace of
    /// will be dropped before querying the store.
    Unsupported,
}

impl MetricNamespace {
    /// Returns the string representation for this metric namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricNamespace::Sessions => "sessions",
            MetricNamespace::Transactions => "transactions",
            MetricNamespace::Custom => "custom",
            MetricNamespace::Unsupported => "unsupported",
        }
    }
}

impl std::str::FromStr for MetricNamespace {
    type Err = ParseMetricError;

    fn from_str(ns: &str) -> Result<Self, Self::Err> {
        match ns {
            "sessions" => Ok(Self::Sessions),
            "transactions" => Ok(Self::Transactions),
            "custom" => Ok(Self::Custom),
            _ => Ok(Self::Unsupported),
        }
    }
}

impl fmt::Display for MetricNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

crate::impl_str_serde!(MetricNamespace, "a metric namespace string");

/// A unique identifier for metrics including typing and namespacing.
///
/// MRIs have the format `<type>:<namespace>/<name>@<unit>`. The unit is
/// optional and defaults to [`MetricUnit::None`].
///
/// # Statically Defined Metrics
///
/// Public metric field names translate to MRIs through a static mapping, for
/// example `"transaction.duration"` maps to
/// `"d:transactions/duration@millisecond"`. Parsing such an MRI yields the
/// type, namespace, and unit needed to address the right storage and to infer
/// the result type of aggregations over the metric.
///
/// # Example
///
/// ```
/// use quarry_base_schema::metrics::MetricResourceIdentifier;
///
/// let string = "c:custom/test@second";
/// let mri = MetricResourceIdentifier::parse(string).expect("should parse");
/// assert_eq!(mri.to_string(), string);
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct MetricResourceIdentifier<'a> {
    /// The type of a metric (counter, distribution, or set).
    pub ty: MetricType,
    /// The namespace for this metric.
    pub namespace: MetricNamespace,
    /// The display name of the metric in the allowed character set.
    pub name: Cow<'a, str>,
    /// The verbatim unit name of the metric value.
    pub unit: MetricUnit,
}

impl<'a> MetricResourceIdentifier<'a> {
    /// Parses and validates an MRI.
    pub fn parse(name: &'a str) -> Result<Self, ParseMetricError> {
        let (raw_ty, rest) = name.split_once(':').ok_or(ParseMetricError)?;
        let ty = raw_ty.parse()?;
        Self::parse_with_type(rest, ty)
    }

    /// Parses an MRI from a string and a separate type.
    ///
    /// The given string must be a part of the MRI, including the following
    /// components:
    ///  - (optional) The namespace. If missing, it is defaulted to `"custom"`
    ///  - (required) The metric name.
    ///  - (optional) The unit. If missing, it is defaulted to "none".
    pub fn parse_with_type(string: &'a str, ty: MetricType) -> Result<Self, ParseMetricError> {
        let (name, unit) = parse_name_unit(string).ok_or(ParseMetricError)?;

        let (namespace, name) = match name {
            Cow::Borrowed(slice) => match slice.split_once('/') {
                Some((raw_namespace, name)) => (raw_namespace.parse()?, name.into()),
                None => (MetricNamespace::Custom, name),
            },
            Cow::Owned(string) => match string.split_once('/') {
                Some((raw_namespace, name)) => (raw_namespace.parse()?, name.to_owned().into()),
                None => (MetricNamespace::Custom, string.into()),
            },
        };

        Ok(Self {
            ty,
            namespace,
            name,
            unit,
        })
    }

    /// Converts the MRI into an owned version with a static lifetime.
    pub fn into_owned(self) -> MetricResourceIdentifier<'static> {
        MetricResourceIdentifier {
            ty: self.ty,
            namespace: self.namespace,
            name: Cow::Owned(self.name.into_owned()),
            unit: self.unit,
        }
    }
}

impl Serialize for MetricResourceIdentifier<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MetricResourceIdentifier<'static> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = <Cow<'de, str>>::deserialize(deserializer)?;
        MetricResourceIdentifier::parse(&string)
            .map(MetricResourceIdentifier::into_owned)
            .map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for MetricResourceIdentifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `<ty>:<ns>/<name>@<unit>`
        write!(
            f,
            "{}:{}/{}@{}",
            self.ty, self.namespace, self.name, self.unit
        )
    }
}

/// Parses the `name[@unit]` part of an MRI.
fn parse_name_unit(string: &str) -> Option<(Cow<'_, str>, MetricUnit)> {
    let mut components = string.splitn(2, '@');
    let name = components.next()?;
    let unit = match components.next() {
        Some(s) => s.parse().ok()?,
        None => MetricUnit::default(),
    };

    let name = try_normalize_metric_name(name)?;
    Some((name, unit))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::metrics::{CustomUnit, DurationUnit};

    use super::*;

    #[test]
    fn test_parse_mri_lenient() {
        assert_eq!(
            MetricResourceIdentifier::parse("c:foo@none").unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Custom,
                name: "foo".into(),
                unit: MetricUnit::None,
            },
        );
        assert_eq!(
            MetricResourceIdentifier::parse("c:foo").unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Custom,
                name: "foo".into(),
                unit: MetricUnit::None,
            },
        );
        assert_eq!(
            MetricResourceIdentifier::parse("c:custom/foo").unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Custom,
                name: "foo".into(),
                unit: MetricUnit::None,
            },
        );
        assert_eq!(
            MetricResourceIdentifier::parse("c:custom/foo@millisecond").unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Custom,
                name: "foo".into(),
                unit: MetricUnit::Duration(DurationUnit::MilliSecond),
            },
        );
        assert_eq!(
            MetricResourceIdentifier::parse("c:something/foo").unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Unsupported,
                name: "foo".into(),
                unit: MetricUnit::None,
            },
        );
        assert_eq!(
            MetricResourceIdentifier::parse("c:foo@something").unwrap(),
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Custom,
                name: "foo".into(),
                unit: MetricUnit::Custom(CustomUnit::parse("something").unwrap()),
            },
        );
        assert!(MetricResourceIdentifier::parse("foo").is_err());
    }

    #[test]
    fn test_parse_mri_statically_defined() {
        let mri = MetricResourceIdentifier::parse("d:transactions/duration@millisecond").unwrap();
        assert_eq!(mri.ty, MetricType::Distribution);
        assert_eq!(mri.namespace, MetricNamespace::Transactions);
        assert_eq!(mri.name, "duration");
        assert_eq!(mri.unit, MetricUnit::Duration(DurationUnit::MilliSecond));

        let mri = MetricResourceIdentifier::parse("s:transactions/user@none").unwrap();
        assert_eq!(mri.ty, MetricType::Set);
        assert_eq!(mri.unit, MetricUnit::None);
    }

    #[test]
    fn test_gauges_are_rejected() {
        assert!(MetricResourceIdentifier::parse("g:transactions/foo@none").is_err());
    }

    #[test]
    fn test_invalid_names_normalized() {
        let mri = MetricResourceIdentifier::parse("c:transactions/foo.bar.blob-size@none");
        assert_eq!(mri.unwrap().name, "foo.bar.blob_size");
    }

    #[test]
    fn test_serialize_mri() {
        let mri = MetricResourceIdentifier {
            ty: MetricType::Counter,
            namespace: MetricNamespace::Custom,
            name: "foo".into(),
            unit: MetricUnit::Duration(DurationUnit::Second),
        };
        assert_eq!(
            serde_json::to_string(&mri).unwrap(),
            "\"c:custom/foo@second\""
        );
    }

    #[test]
    fn test_deserialize_mri() {
        let mri: MetricResourceIdentifier<'static> =
            serde_json::from_str("\"c:custom/foo@second\"").unwrap();
        assert_eq!(
            mri,
            MetricResourceIdentifier {
                ty: MetricType::Counter,
                namespace: MetricNamespace::Custom,
                name: "foo".into(),
                unit: MetricUnit::Duration(DurationUnit::Second),
            },
        );
    }
}
