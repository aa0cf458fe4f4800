use {
    chrono::{
        Datelike,
        NaiveDate,
        Weekday,
    },
    serde::{
        Deserialize,
        Serialize,
        Serializer,
        ser::SerializeMap,
    },
    smol_str::SmolStr,
    std::collections::BTreeMap,
};

pub type CountryCode = SmolStr;
pub type LocalName = SmolStr;
pub type LocalNames = BTreeMap<CountryCode, LocalName>;
pub type Year = i32;

/// A public holiday, named in the language of every country observing it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub date:        NaiveDate,
    pub local_names: LocalNames,
}

impl Holiday {
    pub fn new(date: NaiveDate, country: CountryCode, local_name: LocalName) -> Self {
        Self {
            date,
            local_names: LocalNames::from([(country, local_name)]),
        }
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Body of the count and common holiday requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountryRequest {
    pub year:          Year,
    pub country_codes: Vec<CountryCode>,
}

/// Non-weekend holiday count per country, in the order they should be presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCounts(pub Vec<(CountryCode, usize)>);

#[cfg(test)]
impl HolidayCounts {
    pub fn get(&self, country: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|(code, _)| code == country)
            .map(|(_, count)| *count)
    }

    pub fn countries(&self) -> impl Iterator<Item = &CountryCode> {
        self.0.iter().map(|(code, _)| code)
    }
}

// Serialized as a JSON object whose key order is the order of the counts.
impl Serialize for HolidayCounts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (country, count) in &self.0 {
            map.serialize_entry(country, count)?;
        }
        map.end()
    }
}
