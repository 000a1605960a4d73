// 消息目的地：`{prefix}/room/{roomId}`
use domain::RoomId;

const ROOM_SEGMENT: &str = "/room/";

/// 解析 `{prefix}/room/{digits}`，任何不完全匹配的形式都返回 `None`
pub fn parse_room_destination(destination: &str, prefix: &str) -> Option<RoomId> {
    destination
        .strip_prefix(prefix)?
        .strip_prefix(ROOM_SEGMENT)?
        .parse::<RoomId>()
        .ok()
}

pub fn room_destination(prefix: &str, room_id: RoomId) -> String {
    format!("{prefix}{ROOM_SEGMENT}{room_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room_id() {
        assert_eq!(
            parse_room_destination("/topic/room/42", "/topic"),
            Some(RoomId::from(42))
        );
        assert_eq!(
            parse_room_destination("/app/room/7", "/app"),
            Some(RoomId::from(7))
        );
    }

    #[test]
    fn rejects_malformed_destinations() {
        for destination in [
            "",
            "/topic",
            "/topic/room/",
            "/topic/room/abc",
            "/topic/room/12/extra",
            "/topic/room/-3",
            "/topic/room/+3",
            "/topic/rooms/3",
            "/app/room/3",
            "topic/room/3",
        ] {
            assert_eq!(
                parse_room_destination(destination, "/topic"),
                None,
                "{destination}"
            );
        }
    }

    #[test]
    fn builds_destination() {
        assert_eq!(room_destination("/topic", RoomId::from(9)), "/topic/room/9");
    }
}
