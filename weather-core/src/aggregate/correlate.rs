use serde::{Serialize, Serializer};

use crate::model::{Variable, WeatherSeries};

/// Pearson coefficient for a variable pair, or `Undefined` when fewer than
/// two co-present points exist or either side has no variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correlation {
    Defined(f64),
    Undefined,
}

impl Correlation {
    pub fn value(&self) -> Option<f64> {
        match self {
            Correlation::Defined(r) => Some(*r),
            Correlation::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Correlation::Defined(_))
    }
}

impl Serialize for Correlation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// Square matrix over [`Variable::all`], row and column order alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub variables: Vec<Variable>,
    pub cells: Vec<Vec<Correlation>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Variable, b: Variable) -> Correlation {
        let row = self.variables.iter().position(|v| *v == a);
        let col = self.variables.iter().position(|v| *v == b);
        match (row, col) {
            (Some(r), Some(c)) => self.cells[r][c],
            _ => Correlation::Undefined,
        }
    }
}

/// Pairwise correlation of every numeric variable in one city's series.
pub fn correlate(series: &WeatherSeries) -> CorrelationMatrix {
    let variables = Variable::all().to_vec();

    let cells = variables
        .iter()
        .map(|&a| {
            variables
                .iter()
                .map(|&b| {
                    let pairs = series
                        .observations()
                        .iter()
                        .filter_map(|o| Some((o.value(a)?, o.value(b)?)));
                    pearson(pairs)
                })
                .collect()
        })
        .collect();

    CorrelationMatrix { variables, cells }
}

fn pearson(pairs: impl Iterator<Item = (f64, f64)>) -> Correlation {
    let pairs: Vec<(f64, f64)> = pairs.collect();
    if pairs.len() < 2 {
        return Correlation::Undefined;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return Correlation::Undefined;
    }

    let r = sxy / (sxx * syy).sqrt();
    if r.is_finite() {
        Correlation::Defined(r.clamp(-1.0, 1.0))
    } else {
        Correlation::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_support::*;

    fn approx(c: Correlation, expected: f64) -> bool {
        c.value().is_some_and(|r| (r - expected).abs() < 1e-9)
    }

    #[test]
    fn perfectly_linear_variables_correlate() {
        let s = series(
            "Paris",
            vec![
                obs(0, Some(10.0), Some(90.0)),
                obs(1, Some(20.0), Some(80.0)),
                obs(2, Some(30.0), Some(70.0)),
            ],
        );

        let m = correlate(&s);

        assert!(approx(m.get(Variable::Temperature, Variable::Humidity), -1.0));
        assert!(approx(m.get(Variable::Temperature, Variable::Temperature), 1.0));
        assert_eq!(
            m.get(Variable::Temperature, Variable::Humidity),
            m.get(Variable::Humidity, Variable::Temperature)
        );
    }

    #[test]
    fn only_co_present_points_are_used() {
        let s = series(
            "Paris",
            vec![
                obs(0, Some(10.0), Some(1.0)),
                obs(1, Some(500.0), None),
                obs(2, Some(20.0), Some(2.0)),
                obs(3, None, Some(-40.0)),
                obs(4, Some(30.0), Some(3.0)),
            ],
        );

        let m = correlate(&s);
        assert!(approx(m.get(Variable::Temperature, Variable::Humidity), 1.0));
    }

    #[test]
    fn fewer_than_two_points_is_undefined() {
        let s = series(
            "Paris",
            vec![obs(0, Some(10.0), Some(50.0)), obs(1, Some(12.0), None)],
        );

        let m = correlate(&s);
        let c = m.get(Variable::Temperature, Variable::Humidity);

        assert_eq!(c, Correlation::Undefined);
        assert_eq!(c.value(), None);
        assert_eq!(m.get(Variable::Pressure, Variable::WindSpeed), Correlation::Undefined);
    }

    #[test]
    fn constant_variable_is_undefined_not_nan() {
        let s = series(
            "Paris",
            vec![obs(0, Some(10.0), Some(50.0)), obs(1, Some(12.0), Some(50.0))],
        );

        let c = correlate(&s).get(Variable::Temperature, Variable::Humidity);
        assert_eq!(c, Correlation::Undefined);
    }

    #[test]
    fn matrix_covers_all_variables() {
        let m = correlate(&series("Paris", vec![]));
        assert_eq!(m.variables.len(), Variable::all().len());
        assert!(m.cells.iter().all(|row| row.len() == Variable::all().len()));
        assert!(m.cells.iter().flatten().all(|c| !c.is_defined()));
    }
}
