use std::fmt;
use std::str::FromStr;

use crate::wire_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point3D {
    pub const ZERO: Point3D = Point3D { x: 0, y: 0, z: 0 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, by: Point3D) -> Point3D {
        Point3D::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }
}

impl fmt::Display for Point3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl FromStr for Point3D {
    type Err = String;

    /// Accepts `x y z`, `x,y,z` or `(x, y, z)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .chars()
            .map(|c| if c == ',' || c == '(' || c == ')' { ' ' } else { c })
            .collect();
        let parts: Vec<&str> = cleaned.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(format!("expected three coordinates, got '{}'", s));
        }
        let parse = |p: &str| p.parse::<i32>().map_err(|e| format!("bad coordinate '{}': {}", p, e));
        Ok(Point3D::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

wire_enum! {
    /// Facet an entity lives on. `Internal` holds entities that are logged out
    /// or otherwise parked outside the playable world.
    pub enum Map {
        Felucca = 0,
        Trammel = 1,
        Ilshenar = 2,
        Malas = 3,
        Internal = 0x7F,
    }
}

impl Default for Map {
    fn default() -> Self {
        Map::Internal
    }
}

wire_enum! {
    pub enum Direction {
        North = 0,
        Right = 1,
        East = 2,
        Down = 3,
        South = 4,
        Left = 5,
        West = 6,
        Up = 7,
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::North
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_parse_from_common_forms() {
        assert_eq!("1 2 3".parse::<Point3D>().unwrap(), Point3D::new(1, 2, 3));
        assert_eq!("(1, -2, 3)".parse::<Point3D>().unwrap(), Point3D::new(1, -2, 3));
        assert!("1 2".parse::<Point3D>().is_err());
        assert!("a b c".parse::<Point3D>().is_err());
    }

    #[test]
    fn offsets_add_componentwise() {
        let base = Point3D::new(1000, 2000, 5);
        assert_eq!(base.offset(Point3D::new(1, -1, 2)), Point3D::new(1001, 1999, 7));
    }
}
