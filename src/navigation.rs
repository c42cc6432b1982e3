use crate::error::AppError;
use url::form_urlencoded;

pub const RESOURCES_PATH: &str = "/resources";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillDown {
    pub subscription: String,
    pub resource_group: String,
    pub from: String,
    pub to: String,
}

impl DrillDown {
    pub fn to_route(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("subscription", &self.subscription)
            .append_pair("rg", &self.resource_group)
            .append_pair("from", &self.from)
            .append_pair("to", &self.to)
            .finish();
        format!("{RESOURCES_PATH}?{query}")
    }

    pub fn from_route(route: &str) -> Result<Self, AppError> {
        let (path, query) = route.split_once('?').unwrap_or((route, ""));
        if path != RESOURCES_PATH {
            return Err(AppError::Route(format!(
                "expected {RESOURCES_PATH}, got '{path}'"
            )));
        }

        let mut subscription = None;
        let mut resource_group = None;
        let mut from = None;
        let mut to = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "subscription" => &mut subscription,
                "rg" => &mut resource_group,
                "from" => &mut from,
                "to" => &mut to,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }

        let require = |value: Option<String>, name: &str| {
            value.ok_or_else(|| AppError::Route(format!("missing '{name}' parameter")))
        };

        Ok(Self {
            subscription: require(subscription, "subscription")?,
            resource_group: require(resource_group, "rg")?,
            from: require(from, "from")?,
            to: require(to, "to")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(subscription: &str, rg: &str) -> DrillDown {
        DrillDown {
            subscription: subscription.into(),
            resource_group: rg.into(),
            from: "2024-01-01".into(),
            to: "2024-01-31".into(),
        }
    }

    #[test]
    fn route_encodes_all_parameters_in_order() {
        assert_eq!(
            target("a", "rg1").to_route(),
            "/resources?subscription=a&rg=rg1&from=2024-01-01&to=2024-01-31"
        );
    }

    #[test]
    fn route_round_trips_reserved_characters() {
        let original = target("sub&1=2", "rg with space/+?#");
        let decoded = DrillDown::from_route(&original.to_route()).expect("decode route");
        assert_eq!(decoded, original);
    }

    #[test]
    fn from_route_rejects_other_paths() {
        let err = DrillDown::from_route("/costs?subscription=a").expect_err("wrong path");
        assert!(err.to_string().contains("expected /resources"));
    }

    #[test]
    fn from_route_reports_missing_parameter() {
        let err = DrillDown::from_route("/resources?subscription=a&from=x&to=y")
            .expect_err("missing rg");
        assert!(err.to_string().contains("'rg'"));
    }

    #[test]
    fn from_route_keeps_first_duplicate_and_ignores_unknown_keys() {
        let decoded =
            DrillDown::from_route("/resources?subscription=a&subscription=b&rg=r&from=f&to=t&x=1")
                .expect("decode");
        assert_eq!(decoded.subscription, "a");
        assert_eq!(decoded.resource_group, "r");
    }
}
