use serde::{Deserialize, Serialize};

pub trait Y: Clone {
  fn y(&self) -> f64;
}

pub trait X: Clone {
  fn x(&self) -> i64;
}

impl Y for f64 {
  fn y(&self) -> f64 {
    *self
  }
}

impl X for i64 {
  fn x(&self) -> i64 {
    *self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
  pub x: i64,
  pub y: f64,
}

impl Y for Data {
  fn y(&self) -> f64 {
    self.y.y()
  }
}

impl X for Data {
  fn x(&self) -> i64 {
    self.x.x()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset(pub Vec<Data>);

impl Dataset {
  pub fn new(data: Vec<Data>) -> Self {
    Self(data)
  }

  /// Index each sample by its position, 0th sample has x = 0.
  pub fn from_samples(samples: &[f64]) -> Self {
    Self(
      samples
        .iter()
        .enumerate()
        .map(|(i, &y)| Data { x: i as i64, y })
        .collect(),
    )
  }

  pub fn x(&self) -> Vec<i64> {
    self.0.iter().map(|d| d.x()).collect()
  }

  pub fn y(&self) -> Vec<f64> {
    self.0.iter().map(|d| d.y()).collect()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Append another dataset, keeping both in their given order.
  pub fn extend(&mut self, other: Dataset) {
    self.0.extend(other.0);
  }
}

#[test]
fn extend_keeps_day_order() {
  let mut days = Dataset::from_samples(&[1.0, 2.0]);
  days.extend(Dataset::new(vec![Data { x: 0, y: 3.0 }]));
  assert_eq!(days.len(), 3);
  assert_eq!(days.x(), vec![0, 1, 0]);
  assert_eq!(days.y(), vec![1.0, 2.0, 3.0]);
}
