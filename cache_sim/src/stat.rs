use std::fmt;

pub trait Stat {
    fn view(&self) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats<'s>(&'s self, buf: &mut Stats<'s>);
}

/// stats borrowed from the components that own them.
#[derive(Default)]
pub struct Stats<'s> {
    stats: Vec<&'s dyn Stat>,
}

impl<'s> IntoIterator for Stats<'s> {
    type Item = &'s dyn Stat;

    type IntoIter = <Vec<&'s dyn Stat> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.stats.into_iter()
    }
}

impl<'s> Extend<&'s dyn Stat> for Stats<'s> {
    fn extend<T: IntoIterator<Item = &'s dyn Stat>>(&mut self, iter: T) {
        self.stats.extend(iter)
    }
}

impl<'s> Stats<'s> {
    pub fn push(&mut self, stat: &'s dyn Stat) {
        self.stats.push(stat)
    }
    pub fn len(&self) -> usize {
        self.stats.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
    pub fn view(&self) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view()).collect(),
        }
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0);
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, usize);

    impl Stat for Fixed {
        fn view(&self) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ Fixed {
        fn header(&self) -> &str {
            self.0
        }
        fn width(&self) -> usize {
            self.1
        }
    }

    impl fmt::Display for &'_ Fixed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "  body of {}", self.0)
        }
    }

    #[test]
    fn test_framed_report() {
        let a = Fixed("first", 20);
        let b = Fixed("second", 24);
        let mut stats = Stats::default();
        stats.push(&a);
        stats.extend([&b as &dyn Stat]);
        assert_eq!(2, stats.len());
        let text = format!("{}", stats.view());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!("------ statistics ------", lines[0]);
        assert_eq!("first:", lines[1]);
        assert_eq!("  body of first", lines[2]);
        assert_eq!("second:", lines[3]);
        assert_eq!("-".repeat(24), lines[5]);
    }
    #[test]
    fn test_empty_report() {
        let stats = Stats::default();
        assert!(stats.is_empty());
        assert_eq!(" statistics \n", format!("{}", stats.view()));
    }
}
