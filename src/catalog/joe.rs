//! Per-machine XML catalog (`<stem>.xml`) loader, producing a [`Joe`]
//! machine description: its products, alerts, and maintenance-statistic
//! label banks. Loaded once per connect and replaced on reconnect.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use roxmltree::{Document, Node};
use tracing::{debug, warn};

use crate::error::Error;
use crate::wire::stats::StatisticsData;

use super::machine::Machine;

/// A named enumerated choice, e.g. `COFFEE_STRENGTH` or `TEMPERATURE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemsOption {
    /// Command-buffer argument, of the form `F<n>` (1-based byte index).
    pub argument: String,
    /// Default item value.
    pub default: String,
    /// Ordered (name, value) choices.
    pub items: Vec<OptionItem>,
}

/// One choice of an [`ItemsOption`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptionItem {
    pub name: String,
    pub value: String,
}

/// A linear min/max/step option, e.g. `WATER_AMOUNT` or
/// `MILK_FOAM_AMOUNT`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MinMaxOption {
    /// Command-buffer argument, of the form `F<n>`.
    pub slot: usize,
    pub value: u32,
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl MinMaxOption {
    /// Encodes `value` as a single byte: `value / step`.
    #[must_use]
    pub fn encoded_byte(self) -> u8 {
        (self.value / self.step.max(1)) as u8
    }
}

impl ItemsOption {
    /// The 1-based byte index this option's argument refers to, parsed
    /// from `F<n>`.
    #[must_use]
    pub fn slot(&self) -> Option<usize> {
        parse_f_argument(&self.argument)
    }

    /// The command byte for the currently-selected (default) item, parsed
    /// as a hex byte.
    #[must_use]
    pub fn default_byte(&self) -> Option<u8> {
        u8::from_str_radix(&self.default, 16).ok()
    }
}

/// Parses an `F<n>` argument into a 0-based command-buffer slot (`n - 1`).
fn parse_f_argument(arg: &str) -> Option<usize> {
    let n: usize = arg.strip_prefix('F')?.parse().ok()?;
    n.checked_sub(1)
}

/// A single product offered by the machine.
#[derive(Debug)]
pub struct Product {
    pub name: String,
    /// Command code, as a hex string (e.g. `"04"`).
    pub code: String,
    pub strength: Option<ItemsOption>,
    pub temperature: Option<ItemsOption>,
    pub water_amount: Option<MinMaxOption>,
    pub milk_foam_amount: Option<MinMaxOption>,
    counter: AtomicU32,
}

impl Product {
    /// Builds a `Product` directly from its fields, bypassing XML parsing.
    #[cfg(any(test, feature = "testing"))]
    #[must_use]
    pub fn new_for_test(
        code: &str,
        strength: Option<ItemsOption>,
        temperature: Option<ItemsOption>,
        water_amount: Option<MinMaxOption>,
        milk_foam_amount: Option<MinMaxOption>,
    ) -> Self {
        Self {
            name: String::new(),
            code: code.to_owned(),
            strength,
            temperature,
            water_amount,
            milk_foam_amount,
            counter: AtomicU32::new(0),
        }
    }

    /// The product's code interpreted as a big-endian integer — the slot
    /// index into the product-counters statistics buffer.
    #[must_use]
    pub fn code_index(&self) -> crate::Result<u64> {
        u64::from_str_radix(&self.code, 16)
            .map_err(|e| Error::Catalog(format!("product code {:?} is not hex: {e}", self.code)))
    }

    /// The most recently observed usage counter for this product.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// A named bit position in the decoded Machine-Status buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Alert {
    pub bit: usize,
    pub name: String,
    pub type_tag: Option<String>,
}

/// The per-model description loaded from `<stem>.xml`.
#[derive(Debug)]
pub struct Joe {
    pub dated: String,
    pub machine: Machine,
    pub products: Vec<Product>,
    pub alerts: Vec<Alert>,
    pub maintenance_counter_labels: Vec<String>,
    pub maintenance_percent_labels: Vec<String>,
    total_products: AtomicU32,
}

impl Joe {
    /// The most recently observed total-product count.
    #[must_use]
    pub fn total_products(&self) -> u32 {
        self.total_products.load(Ordering::Relaxed)
    }

    /// Finds the product whose code, as a big-endian integer, equals
    /// `index`.
    #[must_use]
    pub fn product_by_code_index(&self, index: u64) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| p.code_index().map_or(false, |c| c == index))
    }

    /// Applies a decoded [`StatisticsData`] buffer in
    /// [`crate::wire::StatisticsMode::ProductCounters`] mode: updates the
    /// total-products counter and every product whose code resolves to a
    /// slot in the buffer.
    pub fn apply_product_counters(&self, data: &StatisticsData) {
        self.total_products.store(data.total_products(), Ordering::Relaxed);
        for product in &self.products {
            let Ok(idx) = product.code_index() else {
                continue;
            };
            product
                .counter
                .store(data.slot(idx as usize), Ordering::Relaxed);
        }
    }
}

/// Loads the per-machine XML description for `machine` from
/// `<xml_dir>/<machine.file_stem>.xml`.
pub fn load_joe(machine: &Machine, xml_dir: impl AsRef<Path>) -> crate::Result<Joe> {
    let path = xml_dir.as_ref().join(format!("{}.xml", machine.file_stem));
    let text = std::fs::read_to_string(&path)
        .map_err(|e| Error::Catalog(format!("reading {}: {e}", path.display())))?;
    let doc = Document::parse(&text)
        .map_err(|e| Error::Catalog(format!("parsing {}: {e}", path.display())))?;
    let root = doc.root_element();
    if root.tag_name().name() != "JOE" {
        return Err(Error::Catalog(format!(
            "{}: expected <JOE> root, found <{}>",
            path.display(),
            root.tag_name().name()
        )));
    }
    let dated = attr(root, "dated").unwrap_or_default();

    let products = root
        .children()
        .find(|n| n.has_tag_name("PRODUCTS"))
        .map(|n| parse_products(n))
        .transpose()?
        .unwrap_or_default();

    let alerts = root
        .children()
        .find(|n| n.has_tag_name("ALERTS"))
        .map(parse_alerts)
        .unwrap_or_default();

    let (maintenance_counter_labels, maintenance_percent_labels) = root
        .children()
        .find(|n| n.has_tag_name("STATISTIC"))
        .map(parse_maintenance_banks)
        .unwrap_or_default();

    debug!(
        machine = %machine.name,
        products = products.len(),
        alerts = alerts.len(),
        "loaded joe"
    );

    Ok(Joe {
        dated,
        machine: machine.clone(),
        products,
        alerts,
        maintenance_counter_labels,
        maintenance_percent_labels,
        total_products: AtomicU32::new(0),
    })
}

fn attr(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_owned)
}

fn parse_products(products_node: Node<'_, '_>) -> crate::Result<Vec<Product>> {
    products_node
        .children()
        .filter(|n| n.has_tag_name("PRODUCT"))
        .map(parse_product)
        .collect()
}

fn parse_product(node: Node<'_, '_>) -> crate::Result<Product> {
    let name = attr(node, "Name").unwrap_or_default();
    let code = attr(node, "Code")
        .ok_or_else(|| Error::Catalog(format!("PRODUCT {name:?} missing Code attribute")))?;
    let strength = node
        .children()
        .find(|n| n.has_tag_name("COFFEE_STRENGTH"))
        .map(parse_items_option);
    let temperature = node
        .children()
        .find(|n| n.has_tag_name("TEMPERATURE"))
        .map(parse_items_option);
    let water_amount = node
        .children()
        .find(|n| n.has_tag_name("WATER_AMOUNT"))
        .map(parse_min_max_option);
    let milk_foam_amount = node
        .children()
        .find(|n| n.has_tag_name("MILK_FOAM_AMOUNT"))
        .map(parse_min_max_option);
    Ok(Product {
        name,
        code,
        strength,
        temperature,
        water_amount,
        milk_foam_amount,
        counter: AtomicU32::new(0),
    })
}

fn parse_items_option(node: Node<'_, '_>) -> ItemsOption {
    let items = node
        .children()
        .filter(|n| n.has_tag_name("ITEM"))
        .map(|item| OptionItem {
            name: attr(item, "Name").unwrap_or_default(),
            value: attr(item, "Value").unwrap_or_default(),
        })
        .collect();
    ItemsOption {
        argument: attr(node, "Argument").unwrap_or_default(),
        default: attr(node, "Default").unwrap_or_default(),
        items,
    }
}

fn parse_min_max_option(node: Node<'_, '_>) -> MinMaxOption {
    let num = |name: &str| attr(node, name).and_then(|s| s.parse().ok()).unwrap_or(0);
    let slot = attr(node, "Argument")
        .as_deref()
        .and_then(parse_f_argument)
        .unwrap_or(0);
    MinMaxOption {
        slot,
        value: num("Value"),
        min: num("Min"),
        max: num("Max"),
        step: if num("Step") == 0 { 1 } else { num("Step") },
    }
}

fn parse_alerts(alerts_node: Node<'_, '_>) -> Vec<Alert> {
    alerts_node
        .children()
        .filter(|n| n.has_tag_name("ALERT"))
        .filter_map(|n| {
            let bit: usize = attr(n, "Bit")?.parse().ok()?;
            Some(Alert {
                bit,
                name: attr(n, "Name").unwrap_or_default(),
                type_tag: attr(n, "Type"),
            })
        })
        .collect()
}

fn parse_maintenance_banks(statistic_node: Node<'_, '_>) -> (Vec<String>, Vec<String>) {
    let mut counters = Vec::new();
    let mut percents = Vec::new();
    let Some(page) = statistic_node
        .children()
        .find(|n| n.has_tag_name("MAINTENANCEPAGE"))
    else {
        return (counters, percents);
    };
    for bank in page.children().filter(|n| n.has_tag_name("BANK")) {
        let name = attr(bank, "Name").unwrap_or_default();
        let labels: Vec<String> = bank
            .children()
            .filter(|n| n.has_tag_name("TEXTITEM"))
            .map(|n| attr(n, "Type").unwrap_or_default())
            .collect();
        match name.as_str() {
            "Maintenance Counter" => counters = labels,
            "Maintenance Percent" => percents = labels,
            other => warn!(bank = other, "unrecognised maintenance bank name"),
        }
    }
    (counters, percents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"
        <JOE dated="2024-01-01">
          <PRODUCTS>
            <PRODUCT Name="Espresso" Code="04">
              <COFFEE_STRENGTH Argument="F2" Default="03">
                <ITEM Name="Mild" Value="01"/>
                <ITEM Name="Normal" Value="03"/>
              </COFFEE_STRENGTH>
              <WATER_AMOUNT Argument="F3" Value="60" Min="20" Max="120" Step="5"/>
            </PRODUCT>
          </PRODUCTS>
          <ALERTS>
            <ALERT Bit="0" Name="Water tank empty" Type="Warning"/>
            <ALERT Bit="5" Name="Descale now"/>
          </ALERTS>
          <STATISTIC>
            <MAINTENANCEPAGE>
              <BANK Name="Maintenance Counter">
                <TEXTITEM Type="Total cups"/>
                <TEXTITEM Type="Cleanings"/>
              </BANK>
              <BANK Name="Maintenance Percent">
                <TEXTITEM Type="Filter"/>
              </BANK>
            </MAINTENANCEPAGE>
          </STATISTIC>
        </JOE>
    "#;

    fn sample_machine() -> Machine {
        Machine {
            article_number: 1000,
            name: "Test Machine".into(),
            file_stem: "test_machine".into(),
            version: 1,
        }
    }

    fn parse_sample() -> Joe {
        let doc = Document::parse(SAMPLE_XML).unwrap();
        let root = doc.root_element();
        let products = parse_products(root.children().find(|n| n.has_tag_name("PRODUCTS")).unwrap()).unwrap();
        let alerts = parse_alerts(root.children().find(|n| n.has_tag_name("ALERTS")).unwrap());
        let (counters, percents) =
            parse_maintenance_banks(root.children().find(|n| n.has_tag_name("STATISTIC")).unwrap());
        Joe {
            dated: attr(root, "dated").unwrap(),
            machine: sample_machine(),
            products,
            alerts,
            maintenance_counter_labels: counters,
            maintenance_percent_labels: percents,
            total_products: AtomicU32::new(0),
        }
    }

    #[test]
    fn parses_product_options() {
        let joe = parse_sample();
        assert_eq!(joe.dated, "2024-01-01");
        let p = &joe.products[0];
        assert_eq!(p.name, "Espresso");
        assert_eq!(p.code, "04");
        let strength = p.strength.as_ref().unwrap();
        assert_eq!(strength.slot(), Some(1));
        assert_eq!(strength.items.len(), 2);
        let water = p.water_amount.unwrap();
        assert_eq!(water.slot, 2);
        assert_eq!(water.encoded_byte(), 12);
    }

    #[test]
    fn parses_alerts_and_maintenance_labels() {
        let joe = parse_sample();
        assert_eq!(joe.alerts.len(), 2);
        assert_eq!(joe.alerts[1].bit, 5);
        assert_eq!(joe.alerts[1].type_tag, None);
        assert_eq!(joe.maintenance_counter_labels, vec!["Total cups", "Cleanings"]);
        assert_eq!(joe.maintenance_percent_labels, vec!["Filter"]);
    }

    #[test]
    fn product_code_index_is_big_endian_hex() {
        let joe = parse_sample();
        assert_eq!(joe.products[0].code_index().unwrap(), 0x04);
    }
}
