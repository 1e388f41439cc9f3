//! Per-scrape metric family builders on top of `prometheus` gauge vectors.

use std::collections::HashMap;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};

/// Suffix Prometheus clients give info families.
const INFO_SUFFIX: &str = "_info";

/// A gauge family built fresh for one collection pass.
///
/// Info families are gauges named `<name>_info` whose samples carry the
/// attributes as labels and are valued `1`.
pub struct Family {
    vec: GaugeVec,
    label_count: usize,
    samples: usize,
}

impl Family {
    pub fn gauge(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<Self> {
        Ok(Self {
            vec: GaugeVec::new(Opts::new(name, help), labels)?,
            label_count: labels.len(),
            samples: 0,
        })
    }

    pub fn info(name: &str, help: &str, labels: &[&str], attrs: &[&str]) -> prometheus::Result<Self> {
        let names: Vec<&str> = labels.iter().chain(attrs).copied().collect();
        let mut family = Self::gauge(&info_name(name), help, &names)?;
        family.label_count = labels.len();
        Ok(family)
    }

    pub fn add(&mut self, labels: &[&str], value: f64) -> prometheus::Result<()> {
        self.vec.get_metric_with_label_values(labels)?.set(value);
        self.samples += 1;
        Ok(())
    }

    /// Add one info record; `attrs` follow the attribute names given to
    /// [`Family::info`].
    pub fn add_info(&mut self, labels: &[&str], attrs: &[&str]) -> prometheus::Result<()> {
        if labels.len() != self.label_count {
            return Err(prometheus::Error::InconsistentCardinality {
                expect: self.label_count,
                got: labels.len(),
            });
        }
        let values: Vec<&str> = labels.iter().chain(attrs).copied().collect();
        self.add(&values, 1.0)
    }

    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn into_metric_families(self) -> Vec<MetricFamily> {
        self.vec.collect()
    }
}

/// Registry descriptor for a gauge family.
pub fn gauge_desc(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<Desc> {
    Desc::new(
        name.to_string(),
        help.to_string(),
        labels.iter().map(|l| l.to_string()).collect(),
        HashMap::new(),
    )
}

/// Registry descriptor for an info family.
pub fn info_desc(name: &str, help: &str, labels: &[&str], attrs: &[&str]) -> prometheus::Result<Desc> {
    let names: Vec<&str> = labels.iter().chain(attrs).copied().collect();
    gauge_desc(&info_name(name), help, &names)
}

fn info_name(name: &str) -> String {
    format!("{name}{INFO_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn render(family: Family) -> String {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&family.into_metric_families(), &mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn gauge_family_renders_samples() {
        let mut family = Family::gauge("jetson_usage_gpu", "GPU % schedutil", &["gpu"]).unwrap();
        family.add(&["val"], 42.5).unwrap();
        assert_eq!(family.len(), 1);

        let text = render(family);
        assert!(text.contains("# HELP jetson_usage_gpu GPU % schedutil"));
        assert!(text.contains("# TYPE jetson_usage_gpu gauge"));
        assert!(text.contains("jetson_usage_gpu{gpu=\"val\"} 42.5"));
    }

    #[test]
    fn info_family_uses_attributes_as_labels() {
        let mut family =
            Family::info("jetson_network", "Network info", &["interface_name"], &["ip_address"])
                .unwrap();
        family.add_info(&["eth0"], &["192.168.1.40"]).unwrap();

        let text = render(family);
        assert!(text.contains("# TYPE jetson_network_info gauge"));
        assert!(text.contains("jetson_network_info{interface_name=\"eth0\",ip_address=\"192.168.1.40\"} 1"));
    }

    #[test]
    fn wrong_label_count_is_an_error() {
        let mut family = Family::gauge("jetson_uptime", "System uptime", &["uptime"]).unwrap();
        assert!(family.add(&["days", "extra"], 1.0).is_err());
        assert_eq!(family.len(), 0);

        let mut info = Family::info("jetson_board", "Board sys info", &[], &["soc"]).unwrap();
        assert!(info.add_info(&["x"], &["tegra210"]).is_err());
    }

    #[test]
    fn descriptors_match_family_names() {
        let desc = info_desc("jetson_board", "Board sys info", &[], &["soc"]).unwrap();
        assert_eq!(desc.fq_name, "jetson_board_info");
        let desc = gauge_desc("jetson_voltages", "Voltages", &["volts"]).unwrap();
        assert_eq!(desc.variable_labels, vec!["volts".to_string()]);
    }
}
