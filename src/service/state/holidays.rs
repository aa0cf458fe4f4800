// The aggregation engine. Every operation builds its result from fresh listings
// of the holiday-data source; nothing is kept between calls.
use {
    super::{
        Calendar,
        HolidaySource,
    },
    crate::service::{
        holiday::{
            CountryCode,
            Holiday,
            HolidayCounts,
            LocalNames,
            Year,
        },
        upstream::FetchError,
    },
    chrono::{
        Datelike,
        NaiveDate,
    },
    futures_util::future::try_join_all,
    std::collections::{
        BTreeMap,
        BTreeSet,
    },
    tracing::instrument,
};

/// Number of holidays returned by [`Holidays::past_holidays`].
pub const PAST_HOLIDAYS_LIMIT: usize = 3;

/// How many years before the current one [`Holidays::past_holidays`] may look back.
pub const PAST_HOLIDAYS_SEARCH_YEARS: Year = 100;

#[async_trait::async_trait]
pub trait Holidays {
    /// The most recent holidays strictly before today, newest first.
    async fn past_holidays(&self, country: &CountryCode) -> Result<Vec<Holiday>, FetchError>;

    /// Holidays of `year` not falling on a weekend, per country, largest count first.
    async fn holidays_count(
        &self,
        year: Year,
        countries: &[CountryCode],
    ) -> Result<HolidayCounts, FetchError>;

    /// Dates of `year` that are a holiday in every one of `countries`, oldest first.
    async fn common_holidays(
        &self,
        year: Year,
        countries: &[CountryCode],
    ) -> Result<Vec<Holiday>, FetchError>;
}

#[async_trait::async_trait]
impl<T> Holidays for T
where
    T: HolidaySource,
    T: Calendar,
    T: Sync,
{
    #[instrument(skip(self))]
    async fn past_holidays(&self, country: &CountryCode) -> Result<Vec<Holiday>, FetchError> {
        let today = self.today();
        let current_year = today.year();
        let oldest_year = current_year - PAST_HOLIDAYS_SEARCH_YEARS;

        let mut past = Vec::new();
        let mut year = current_year;

        // Batches are appended newest year first and are each sorted newest
        // first, so the accumulated list is ordered without a final sort.
        while past.len() < PAST_HOLIDAYS_LIMIT && year >= oldest_year {
            let mut batch = before(self.fetch_holidays(year, country).await?, today);
            batch.sort_by(|a, b| b.date.cmp(&a.date));
            past.extend(batch);
            year -= 1;
        }

        past.truncate(PAST_HOLIDAYS_LIMIT);
        tracing::debug!(found = past.len(), "Past holidays collected.");
        Ok(past)
    }

    #[instrument(skip(self))]
    async fn holidays_count(
        &self,
        year: Year,
        countries: &[CountryCode],
    ) -> Result<HolidayCounts, FetchError> {
        let fetches = countries.iter().map(move |country| async move {
            let holidays = self.fetch_holidays(year, country).await?;
            let weekdays = holidays.iter().filter(|holiday| !holiday.is_weekend()).count();
            Ok::<_, FetchError>((country.clone(), weekdays))
        });

        // Results come back in input order; the stable sort keeps that order for ties.
        let mut counts = try_join_all(fetches).await?;
        counts.sort_by(|(_, a), (_, b)| b.cmp(a));

        Ok(HolidayCounts(counts))
    }

    #[instrument(skip(self))]
    async fn common_holidays(
        &self,
        year: Year,
        countries: &[CountryCode],
    ) -> Result<Vec<Holiday>, FetchError> {
        let requested: BTreeSet<&CountryCode> = countries.iter().collect();
        let mut by_date: BTreeMap<NaiveDate, LocalNames> = BTreeMap::new();

        for country in &requested {
            let holidays = match self.fetch_holidays(year, country).await {
                Ok(holidays) => holidays,
                // A country without data cannot share any date with the others.
                Err(FetchError::NotFound { .. }) => {
                    tracing::debug!(country = %country, "No holiday data, treating as empty.");
                    vec![]
                }
                Err(err) => return Err(err),
            };

            for holiday in holidays {
                let names = by_date.entry(holiday.date).or_default();
                for (_, local_name) in holiday.local_names {
                    names.insert((*country).clone(), local_name);
                }
            }
        }

        Ok(by_date
            .into_iter()
            .filter(|(_, names)| requested.iter().all(|country| names.contains_key(*country)))
            .map(|(date, local_names)| Holiday { date, local_names })
            .collect())
    }
}

fn before(holidays: Vec<Holiday>, today: NaiveDate) -> Vec<Holiday> {
    holidays
        .into_iter()
        .filter(|holiday| holiday.date < today)
        .collect()
}
