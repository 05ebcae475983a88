//! One portal run: open, then scrape, normalize, enroll and append for each
//! scope.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::browser::session::SessionOpener;
use crate::browser::OfferPage;
use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::enroll::EnrollmentActuator;
use crate::error::OfferError;
use crate::models::{Bank, CardInfo, Offer};
use crate::normalize::{apply_terms, Candidate, Normalizer, OfferContext, SeenOffers};
use crate::portal::{Portal, Scope};
use crate::scrape::OfferScraper;
use crate::sheets::SheetSync;

/// Counts for one run, printed as the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub bank: Bank,
    pub dry_run: bool,
    pub scopes: usize,
    pub skipped_scopes: usize,
    pub scraped: usize,
    pub duplicates: usize,
    pub parse_failures: usize,
    pub enrolled: usize,
    pub already_enrolled: usize,
    pub enroll_failures: usize,
    /// New offers left unclicked because the click cap was reached.
    pub capped: usize,
    pub appended: usize,
}

impl RunReport {
    fn new(bank: Bank, dry_run: bool) -> Self {
        Self {
            bank,
            dry_run,
            scopes: 0,
            skipped_scopes: 0,
            scraped: 0,
            duplicates: 0,
            parse_failures: 0,
            enrolled: 0,
            already_enrolled: 0,
            enroll_failures: 0,
            capped: 0,
            appended: 0,
        }
    }
}

pub struct OfferPipeline<'a> {
    portal: &'a dyn Portal,
    timing: &'a TimingConfig,
    sheet: SheetSync<'a>,
    clock: &'a dyn Clock,
    dry_run: bool,
    interactive: bool,
}

impl<'a> OfferPipeline<'a> {
    pub fn new(
        portal: &'a dyn Portal,
        timing: &'a TimingConfig,
        sheet: SheetSync<'a>,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            portal,
            timing,
            sheet,
            clock,
            dry_run: false,
            interactive: false,
        }
    }

    /// Scrape and normalize only: no clicks and no sheet writes.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Wait for a person to sign in when the portal shows its login page.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub async fn run(&self, page: &dyn OfferPage) -> Result<RunReport> {
        match self.run_inner(page).await {
            Ok(report) => Ok(report),
            Err(err) => {
                self.log("ERROR", "run", &format!("{err:#}")).await;
                Err(err)
            }
        }
    }

    async fn run_inner(&self, page: &dyn OfferPage) -> Result<RunReport> {
        let portal = self.portal;
        let mut report = RunReport::new(portal.bank(), self.dry_run);

        SessionOpener::new(portal, self.timing, self.interactive)
            .open(page)
            .await?;

        if !self.dry_run {
            self.sheet.prepare().await?;
        }
        let mut seen = self.sheet.existing_keys().await?;
        info!(bank = %portal.bank(), known = seen.len(), "Loaded sheet offers");

        for scope in portal.discover_scopes(page, self.timing).await? {
            report.scopes += 1;
            if !portal.enter_scope(page, &scope, self.timing).await? {
                warn!(bank = %portal.bank(), %scope, "Could not open scope; skipping");
                self.log("WARNING", "enter_scope", &format!("Could not open {scope}"))
                    .await;
                report.skipped_scopes += 1;
                continue;
            }
            let offers = self.run_scope(page, &scope, &mut seen, &mut report).await?;
            if self.dry_run {
                for offer in &offers {
                    println!("[dry-run] {} | {}", offer.merchant(), offer.description());
                }
            } else {
                report.appended += self.sheet.append(&offers).await?;
            }
        }

        info!(
            bank = %portal.bank(),
            enrolled = report.enrolled,
            appended = report.appended,
            "Run complete"
        );
        Ok(report)
    }

    /// Offers from one scope that should be written, in page order.
    async fn run_scope(
        &self,
        page: &dyn OfferPage,
        scope: &Scope,
        seen: &mut SeenOffers,
        report: &mut RunReport,
    ) -> Result<Vec<Offer>> {
        let portal = self.portal;
        let settings = portal.settings();
        let today = self.clock.today();

        let card = match portal.scope_card_info(scope) {
            Some(card) => card,
            None => portal
                .parse_card_info(&page.page_text().await?)
                .unwrap_or_else(|| CardInfo::unknown(portal.bank())),
        };
        info!(
            bank = %portal.bank(),
            %scope,
            card = %card.name,
            last_four = %card.last_four,
            "Scanning offers"
        );
        let normalizer = Normalizer::new(
            portal.bank(),
            today,
            OfferContext {
                holder: settings.holder.clone(),
                card,
                local_keywords: settings.local_keywords.clone(),
            },
        );
        let scraper = OfferScraper::new(portal, self.timing);
        let mut actuator = EnrollmentActuator::new(portal, self.timing);
        let mut attempted = HashSet::new();
        let mut to_write = Vec::new();

        let mut round = 0;
        loop {
            let raws = scraper.scrape(page).await?;
            report.scraped += raws.len();
            let batch = normalizer.normalize_new(raws, seen);
            report.duplicates += batch.duplicates();
            report.parse_failures += batch.failures.len();

            let mut enrolled_this_round = 0;
            for Candidate {
                raw,
                mut offer,
                recorded,
            } in batch.candidates
            {
                // Clicks follow the card; rows follow the key.
                if raw.enrolled {
                    report.already_enrolled += 1;
                    if !recorded {
                        keep(offer, seen, &mut to_write, report);
                    }
                    continue;
                }
                if self.dry_run {
                    if !recorded {
                        keep(offer, seen, &mut to_write, report);
                    }
                    continue;
                }
                if !attempted.insert(raw.fingerprint.clone()) {
                    continue;
                }
                if actuator.exhausted() {
                    if report.capped == 0 {
                        warn!(
                            max_clicks = settings.max_clicks,
                            "Click cap reached; leaving the rest for the next run"
                        );
                    }
                    report.capped += 1;
                    continue;
                }

                match actuator.enroll(page, &raw, offer.merchant()).await {
                    Ok(enrollment) => {
                        if let Some(detail) = enrollment.detail_text {
                            if let Some(card) = portal.parse_card_info(&detail) {
                                offer.card = card;
                            }
                            apply_terms(&mut offer, &detail, today, &settings.local_keywords);
                        }
                        offer.enrolled = true;
                        report.enrolled += 1;
                        enrolled_this_round += 1;
                        println!("Enrolled: {} ({})", offer.merchant(), offer.description());
                    }
                    Err(err) => {
                        let err = err.downcast::<OfferError>()?;
                        warn!(merchant = %offer.merchant(), error = %err, "Enrollment failed");
                        self.log("WARNING", "enroll", &err.to_string()).await;
                        report.enroll_failures += 1;
                    }
                }
                if !recorded {
                    keep(offer, seen, &mut to_write, report);
                }
            }

            if self.dry_run || enrolled_this_round == 0 || round >= settings.refresh_rounds {
                break;
            }
            round += 1;
            info!(round, "Reloading for more offers");
            page.reload().await?;
            tokio::time::sleep(self.timing.page_load_pause).await;
        }

        Ok(to_write)
    }

    async fn log(&self, level: &str, function: &str, message: &str) {
        if self.dry_run {
            return;
        }
        let time = self.clock.now().naive_utc();
        self.sheet.log(time, level, function, message).await;
    }
}

/// Queue `offer` for writing unless its key was written earlier in the run.
fn keep(offer: Offer, seen: &mut SeenOffers, to_write: &mut Vec<Offer>, report: &mut RunReport) {
    if seen.insert(offer.dedupe_key().clone()) {
        to_write.push(offer);
    } else {
        report.duplicates += 1;
    }
}
