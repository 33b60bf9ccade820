// Grand-total rows.
//
// A summary row type implements [`Rollup`]: how to add another row's
// counts into itself and how to derive its percentage columns from those
// counts. The grand total is built by summing counts into a labelled shell
// row and then recomputing its percentages, so it never averages the
// per-row percentages.

pub trait Rollup {
    /// Add the additive columns of `other` into `self`.
    fn absorb(&mut self, other: &Self);

    /// Derive percentage columns from the additive ones.
    fn recompute(&mut self);
}

/// Sum `rows` into `shell`, recompute its percentages and return it.
pub fn grand_total<T: Rollup>(rows: &[T], mut shell: T) -> T {
    for r in rows {
        shell.absorb(r);
    }
    shell.recompute();
    shell
}

/// Append the grand total row built from every row currently in `rows`.
pub fn append_grand_total<T: Rollup>(rows: &mut Vec<T>, shell: T) {
    let total = grand_total(rows, shell);
    rows.push(total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::percent;

    #[derive(Debug, Default, PartialEq)]
    struct Hits {
        label: String,
        hits: u64,
        tries: u64,
        rate: f64,
    }

    impl Rollup for Hits {
        fn absorb(&mut self, other: &Self) {
            self.hits += other.hits;
            self.tries += other.tries;
        }
        fn recompute(&mut self) {
            self.rate = percent(self.hits as f64, self.tries as f64);
        }
    }

    fn row(hits: u64, tries: u64) -> Hits {
        let mut h = Hits {
            hits,
            tries,
            ..Default::default()
        };
        h.recompute();
        h
    }

    #[test]
    fn total_rate_is_recomputed_not_averaged() {
        let mut rows = vec![row(1, 1), row(0, 99)];
        append_grand_total(
            &mut rows,
            Hits {
                label: "Grand Total".into(),
                ..Default::default()
            },
        );
        let total = rows.last().unwrap();
        assert_eq!(total.label, "Grand Total");
        assert_eq!(total.hits, 1);
        assert_eq!(total.tries, 100);
        // averaging would give 50.0
        assert_eq!(total.rate, 1.0);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn empty_input_gives_zeroed_total() {
        let total = grand_total(&[], Hits::default());
        assert_eq!(total, Hits::default());
    }
}
